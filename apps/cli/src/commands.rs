//! Line commands typed at the `stager>` prompt.

use std::path::PathBuf;

use shared::domain::{RecordId, Theme};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load { path: PathBuf },
    Samples,
    /// Number as printed by `samples`, counting from 1.
    Sample { n: usize },
    Unload,
    Describe { text: String },
    Resolution { px: u32 },
    Generate,
    Feedback { text: String },
    /// Inline feedback replaces the pending text before refining.
    Refine { feedback: Option<String> },
    History,
    Select { id: RecordId },
    Reset,
    Theme { theme: Option<Theme> },
    Export { dir: PathBuf },
    View,
    Details,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  load <path>         pick the room photo
  samples             list the sample rooms
  sample <n>          pick sample number n as the room photo
  unload              drop the picked photo
  describe <text>     set the room description
  resolution <px>     target shortest side, 768-4096 in steps of 64
  generate            run upload, prompt enhancement and generation
  feedback <text>     set refinement feedback
  refine [text]       refine the current result
  history             list recent results, newest first
  select <id>         show a history entry
  reset               forget the current chain, keep history
  theme [light|dark]  show or change the theme
  export <dir>        save the staged image
  view                print the full-size image URL
  details             print reasoning and prompt of the shown result
  status              check the backend
  quit";

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "load" | "open" => Command::Load {
            path: PathBuf::from(required(rest, "load <path>")?),
        },
        "samples" => Command::Samples,
        "sample" => Command::Sample {
            n: required(rest, "sample <n>")?
                .parse()
                .map_err(|_| format!("'{rest}' is not a sample number"))?,
        },
        "unload" | "remove" => Command::Unload,
        "describe" | "desc" => Command::Describe {
            text: rest.to_string(),
        },
        "resolution" | "res" => Command::Resolution {
            px: required(rest, "resolution <px>")?
                .parse()
                .map_err(|_| format!("'{rest}' is not a pixel count"))?,
        },
        "generate" | "gen" => Command::Generate,
        "feedback" => Command::Feedback {
            text: rest.to_string(),
        },
        "refine" => Command::Refine {
            feedback: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "history" | "ls" => Command::History,
        "select" => Command::Select {
            id: RecordId(
                required(rest, "select <id>")?
                    .parse()
                    .map_err(|_| format!("'{rest}' is not a record id"))?,
            ),
        },
        "reset" => Command::Reset,
        "theme" if rest.is_empty() => Command::Theme { theme: None },
        "theme" => Command::Theme {
            theme: Some(rest.parse().map_err(|err| format!("{err}"))?),
        },
        "export" | "save" => Command::Export {
            dir: PathBuf::from(if rest.is_empty() { "." } else { rest }),
        },
        "view" => Command::View,
        "details" | "prompt" => Command::Details,
        "status" | "health" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(command))
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arguments() {
        assert_eq!(
            parse("load ./rooms/empty room.png"),
            Ok(Some(Command::Load {
                path: PathBuf::from("./rooms/empty room.png")
            }))
        );
        assert_eq!(
            parse("  res 1536 "),
            Ok(Some(Command::Resolution { px: 1536 }))
        );
        assert_eq!(
            parse("select 4"),
            Ok(Some(Command::Select { id: RecordId(4) }))
        );
        assert_eq!(
            parse("theme dark"),
            Ok(Some(Command::Theme {
                theme: Some(Theme::Dark)
            }))
        );
        assert_eq!(
            parse("refine brighter walls"),
            Ok(Some(Command::Refine {
                feedback: Some("brighter walls".into())
            }))
        );
        assert_eq!(parse("refine"), Ok(Some(Command::Refine { feedback: None })));
        assert_eq!(parse("sample 2"), Ok(Some(Command::Sample { n: 2 })));
        assert_eq!(parse("samples"), Ok(Some(Command::Samples)));
        assert_eq!(parse("prompt"), Ok(Some(Command::Details)));
        assert_eq!(parse(""), Ok(None));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("select x").is_err());
        assert!(parse("load").is_err());
        assert!(parse("sample two").is_err());
        assert!(parse("dance").is_err());
    }
}
