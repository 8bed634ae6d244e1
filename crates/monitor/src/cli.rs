//! Command-line parsing for `coldreach-monitor`.

use coldreach_core::types::OperationId;

pub const USAGE: &str = "\
usage: coldreach-monitor events [campaign-id ...]
       coldreach-monitor progress <operation-id>";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Tail the session event bus, subscribing to the given campaigns.
    Events { campaigns: Vec<String> },
    /// Follow one operation's progress until it ends.
    Progress { operation_id: OperationId },
}

pub fn parse<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    match args.next().as_deref() {
        Some("events") => Ok(Command::Events {
            campaigns: args.collect(),
        }),
        Some("progress") => match (args.next(), args.next()) {
            (Some(id), None) if !id.is_empty() => Ok(Command::Progress {
                operation_id: OperationId::new(id),
            }),
            _ => Err("progress takes exactly one operation id".into()),
        },
        Some(other) => Err(format!("unknown command '{other}'")),
        None => Err("missing command".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn events_with_campaigns() {
        assert_eq!(
            parse(args(&["events", "c-1", "c-2"])),
            Ok(Command::Events {
                campaigns: vec!["c-1".into(), "c-2".into()]
            })
        );
        assert_eq!(
            parse(args(&["events"])),
            Ok(Command::Events { campaigns: vec![] })
        );
    }

    #[test]
    fn progress_needs_one_id() {
        assert_eq!(
            parse(args(&["progress", "op-1"])),
            Ok(Command::Progress {
                operation_id: OperationId::new("op-1")
            })
        );
        assert!(parse(args(&["progress"])).is_err());
        assert!(parse(args(&["progress", "a", "b"])).is_err());
    }

    #[test]
    fn unknown_or_missing_command() {
        assert!(parse(args(&["tail"])).is_err());
        assert!(parse(args(&[])).is_err());
    }
}
