//! Output formatting for echo-cli (text, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use streamcall_client::echo::EchoResponse;
use streamcall_client::{Code, Status, StreamEvent};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per event (default)
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl OutputFormat {
    /// Parse a format name from the config file
    pub fn parse(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet && self.format == OutputFormat::Text {
            eprintln!("{}", msg.dimmed());
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print one call event in the configured format
    pub fn print_event(&self, event: &StreamEvent<EchoResponse>) {
        match self.format {
            OutputFormat::Text => match event {
                StreamEvent::Data(response) => println!("{}", response.message),
                StreamEvent::Status(status) => self.print_status(status),
                StreamEvent::End => {
                    if !self.quiet {
                        println!("{}", "end".green());
                    }
                }
            },
            OutputFormat::Json => print_json(&EventRow::from(event)),
        }
    }

    /// Print the reply of a unary call
    pub fn print_reply(&self, response: &EchoResponse) {
        match self.format {
            OutputFormat::Text => println!("{}", response.message),
            OutputFormat::Json => print_json(&EventRow::Data {
                message: &response.message,
            }),
        }
    }

    /// Print a final status
    pub fn print_status(&self, status: &Status) {
        match self.format {
            OutputFormat::Text => {
                let line = if status.message.is_empty() {
                    status.code.to_string()
                } else {
                    format!("{} {}", status.code, status.message)
                };
                if status.is_ok() {
                    println!("{}", line.green());
                } else {
                    eprintln!("{}", line.red());
                }
            }
            OutputFormat::Json => print_json(&EventRow::from_status(status)),
        }
    }
}

fn print_json<T: Serialize>(row: &T) {
    if let Ok(json) = serde_json::to_string(row) {
        println!("{}", json);
    }
}

/// JSON shape of one printed event
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum EventRow<'a> {
    Data { message: &'a str },
    Status { code: Code, message: &'a str },
    End,
}

impl<'a> EventRow<'a> {
    fn from_status(status: &'a Status) -> Self {
        EventRow::Status {
            code: status.code,
            message: &status.message,
        }
    }
}

impl<'a> From<&'a StreamEvent<EchoResponse>> for EventRow<'a> {
    fn from(event: &'a StreamEvent<EchoResponse>) -> Self {
        match event {
            StreamEvent::Data(response) => EventRow::Data {
                message: &response.message,
            },
            StreamEvent::Status(status) => EventRow::from_status(status),
            StreamEvent::End => EventRow::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_rows() {
        let data = StreamEvent::Data(EchoResponse {
            message: "hi".into(),
        });
        assert_eq!(
            serde_json::to_string(&EventRow::from(&data)).unwrap(),
            r#"{"event":"data","message":"hi"}"#
        );

        let status = StreamEvent::Status(Status::unavailable("down"));
        assert_eq!(
            serde_json::to_string(&EventRow::from(&status)).unwrap(),
            r#"{"event":"status","code":"UNAVAILABLE","message":"down"}"#
        );

        let end = StreamEvent::End;
        assert_eq!(
            serde_json::to_string(&EventRow::from(&end)).unwrap(),
            r#"{"event":"end"}"#
        );
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::parse("table"), None);
    }
}
