//! Text commands read by the interactive shell.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::{MachineFilter, TelemetryKind};

use super::{
    events::{ImageNavigation, ListKind, SessionCommand, SessionEvent, StylingChange},
    state::{Color, LayoutState},
};

pub const HELP_TEXT: &str = "\
filter <text>             narrow the study list (empty clears)
machine <name>|All        restrict studies to one machine
study <name>              select a study
type scalar|image         switch telemetry kind
tag <label>               plot a single tag
select <label>[,<label>]  choose tags for an overlay plot; quote labels
                          that contain commas: select \"a,b\", loss
plot                      overlay the selected tags
log|markers|hgrid|vgrid on|off
grid-color <color>        gray, black, blue, green, red, orange
line-color <color>        blue, black, red, green, orange, purple
next | prev | seek <n>    move through image frames
layout <geometry> [sash]  remember the window layout
export [dir]              write the current plot or frame to disk
status                    show the current selection
machines | studies | tags list the choices, the current one marked *
quit                      save settings and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellInput {
    Command(SessionCommand),
    Help,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("'{value}' is not valid for {command}")]
    Invalid { command: &'static str, value: String },
}

pub fn parse_line(line: &str) -> Result<ShellInput, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ShellInput::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let event = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(ShellInput::Help),
        "quit" | "exit" => return Ok(ShellInput::Command(SessionCommand::Close)),
        "status" => return Ok(ShellInput::Command(SessionCommand::Status)),
        "machines" => return Ok(ShellInput::Command(SessionCommand::List(ListKind::Machines))),
        "studies" => return Ok(ShellInput::Command(SessionCommand::List(ListKind::Studies))),
        "tags" => return Ok(ShellInput::Command(SessionCommand::List(ListKind::Tags))),
        "export" => {
            let dir = (!rest.is_empty()).then(|| PathBuf::from(rest));
            return Ok(ShellInput::Command(SessionCommand::Export(dir)));
        }
        "filter" => SessionEvent::FilterTextChanged(rest.to_string()),
        "machine" => SessionEvent::MachineChanged(MachineFilter::from_label(required("machine", rest)?)),
        "study" => SessionEvent::StudyChanged(required("study", rest)?.to_string()),
        "type" => {
            let value = required("type", rest)?;
            let kind = TelemetryKind::parse(value).ok_or_else(|| invalid("type", value))?;
            SessionEvent::TypeChanged(kind)
        }
        "tag" => SessionEvent::TagChanged(required("tag", rest)?.to_string()),
        "select" => SessionEvent::ListboxMultiSelectChanged(split_labels(rest)),
        "plot" => SessionEvent::PlotSelected,
        "log" => SessionEvent::StylingChanged(StylingChange::LogScaleY(switch("log", rest)?)),
        "markers" => SessionEvent::StylingChanged(StylingChange::ShowMarkers(switch("markers", rest)?)),
        "hgrid" => SessionEvent::StylingChanged(StylingChange::ShowHGrid(switch("hgrid", rest)?)),
        "vgrid" => SessionEvent::StylingChanged(StylingChange::ShowVGrid(switch("vgrid", rest)?)),
        "grid-color" => SessionEvent::StylingChanged(StylingChange::GridColor(color("grid-color", rest)?)),
        "line-color" => SessionEvent::StylingChanged(StylingChange::LineColor(color("line-color", rest)?)),
        "next" => SessionEvent::ImageNavigate(ImageNavigation::Next),
        "prev" => SessionEvent::ImageNavigate(ImageNavigation::Prev),
        "seek" => {
            let value = required("seek", rest)?;
            let position = value.parse().map_err(|_| invalid("seek", value))?;
            SessionEvent::ImageNavigate(ImageNavigation::Seek(position))
        }
        "layout" => SessionEvent::LayoutChanged(layout(required("layout", rest)?)?),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(ShellInput::Command(SessionCommand::Event(event)))
}

fn required<'a>(command: &'static str, rest: &'a str) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(rest)
    }
}

fn invalid(command: &'static str, value: &str) -> CommandError {
    CommandError::Invalid {
        command,
        value: value.to_string(),
    }
}

/// Splits on commas outside double quotes. Quotes are dropped.
fn split_labels(rest: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in rest.chars() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => labels.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    labels.push(current);
    labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn switch(command: &'static str, rest: &str) -> Result<bool, CommandError> {
    match required(command, rest)?.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(invalid(command, rest)),
    }
}

fn color(command: &'static str, rest: &str) -> Result<Color, CommandError> {
    let value = required(command, rest)?;
    Color::parse(value).ok_or_else(|| invalid(command, value))
}

fn layout(rest: &str) -> Result<LayoutState, CommandError> {
    let mut parts = rest.split_whitespace();
    let geometry = parts.next().map(str::to_string);
    let pane_sash_position = match parts.next() {
        Some(value) => Some(value.parse().map_err(|_| invalid("layout", value))?),
        None => None,
    };
    Ok(LayoutState {
        window_geometry: geometry,
        pane_sash_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(line: &str) -> SessionEvent {
        match parse_line(line) {
            Ok(ShellInput::Command(SessionCommand::Event(event))) => event,
            other => panic!("expected an event from {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn keeps_spaces_inside_arguments() {
        assert_eq!(
            event("tag  PGC/loss total "),
            SessionEvent::TagChanged("PGC/loss total".into())
        );
        assert_eq!(event("filter"), SessionEvent::FilterTextChanged(String::new()));
    }

    #[test]
    fn machine_all_means_no_filter() {
        assert_eq!(event("machine All"), SessionEvent::MachineChanged(MachineFilter::All));
        assert_eq!(
            event("machine zen"),
            SessionEvent::MachineChanged(MachineFilter::Named("zen".into()))
        );
    }

    #[test]
    fn selections_split_on_commas() {
        assert_eq!(
            event("select loss, PGC/acc,,"),
            SessionEvent::ListboxMultiSelectChanged(vec!["loss".into(), "PGC/acc".into()])
        );
    }

    #[test]
    fn quoted_labels_keep_their_commas() {
        assert_eq!(
            event(r#"select "lr,decay", loss"#),
            SessionEvent::ListboxMultiSelectChanged(vec!["lr,decay".into(), "loss".into()])
        );
        assert_eq!(
            event(r#"select "a, b""#),
            SessionEvent::ListboxMultiSelectChanged(vec!["a, b".into()])
        );
        assert_eq!(event("select"), SessionEvent::ListboxMultiSelectChanged(Vec::new()));
    }

    #[test]
    fn styling_and_navigation() {
        assert_eq!(
            event("log on"),
            SessionEvent::StylingChanged(StylingChange::LogScaleY(true))
        );
        assert_eq!(
            event("line-color Red"),
            SessionEvent::StylingChanged(StylingChange::LineColor(Color::Red))
        );
        assert_eq!(event("seek -2"), SessionEvent::ImageNavigate(ImageNavigation::Seek(-2)));
        assert_eq!(
            event("layout 800x600+5+5 240"),
            SessionEvent::LayoutChanged(LayoutState {
                window_geometry: Some("800x600+5+5".into()),
                pane_sash_position: Some(240),
            })
        );
    }

    #[test]
    fn session_commands() {
        assert_eq!(parse_line("  "), Ok(ShellInput::Empty));
        assert_eq!(parse_line("help"), Ok(ShellInput::Help));
        assert_eq!(
            parse_line("QUIT"),
            Ok(ShellInput::Command(SessionCommand::Close))
        );
        assert_eq!(
            parse_line("Studies"),
            Ok(ShellInput::Command(SessionCommand::List(ListKind::Studies)))
        );
        assert_eq!(
            parse_line("machines"),
            Ok(ShellInput::Command(SessionCommand::List(ListKind::Machines)))
        );
        assert_eq!(
            parse_line("tags"),
            Ok(ShellInput::Command(SessionCommand::List(ListKind::Tags)))
        );
        assert_eq!(
            parse_line("export plots/run 1"),
            Ok(ShellInput::Command(SessionCommand::Export(Some(PathBuf::from(
                "plots/run 1"
            )))))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_line("zoom"), Err(CommandError::Unknown("zoom".into())));
        assert_eq!(parse_line("study"), Err(CommandError::MissingArgument("study")));
        assert_eq!(
            parse_line("type audio"),
            Err(CommandError::Invalid {
                command: "type",
                value: "audio".into()
            })
        );
        assert!(parse_line("hgrid maybe").is_err());
        assert!(parse_line("seek first").is_err());
    }
}
