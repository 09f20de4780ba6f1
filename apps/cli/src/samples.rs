//! Bundled sample rooms a session can start from instead of an own photo.

use std::path::{Path, PathBuf};

use anyhow::Context;

const SAMPLE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn is_sample_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SAMPLE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Sample images in `dir`, sorted by file name. A missing directory has none.
pub async fn list_samples(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list {}", dir.display()));
        }
    };

    let mut samples = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?
    {
        let path = entry.path();
        if is_sample_image(&path) {
            samples.push(path);
        }
    }
    samples.sort();
    Ok(samples)
}

/// The sample listed as number `n`, counting from 1.
pub async fn pick_sample(dir: &Path, n: usize) -> anyhow::Result<PathBuf> {
    let samples = list_samples(dir).await?;
    let count = samples.len();
    n.checked_sub(1)
        .and_then(|index| samples.into_iter().nth(index))
        .with_context(|| format!("no sample {n}; {count} available in {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn lists_only_images_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b_kitchen.JPG", "a_bedroom.png", "notes.txt", "c_loft.webp"] {
            fs::write(dir.path().join(name), b"x").expect("write sample");
        }

        let samples = list_samples(dir.path()).await.expect("list");
        let names: Vec<_> = samples
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a_bedroom.png", "b_kitchen.JPG"]);

        let second = pick_sample(dir.path(), 2).await.expect("pick");
        assert!(second.ends_with("b_kitchen.JPG"));
        assert!(pick_sample(dir.path(), 0).await.is_err());
        assert!(pick_sample(dir.path(), 3).await.is_err());
    }

    #[tokio::test]
    async fn missing_directory_has_no_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let samples = list_samples(&dir.path().join("absent")).await.expect("list");
        assert!(samples.is_empty());
    }
}
