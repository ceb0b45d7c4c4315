// Console front-end - line-oriented terminal UI for the scanner
//
// Commands are read from stdin and parsed with regex; session events are
// printed as they arrive from the controller's broadcast channel.

use crate::controller::{ScanController, ScanRequest};
use crate::models::{CodeSource, ScanState};
use crate::services::inventory::{self, ItemStore, NewItemForm, StatusFilter};
use crate::state::SessionEvent;
use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;

pub const HELP: &str = "\
Commands:
  start                      open the camera and scan
  stop                       cancel the running scan
  retry                      retry after a failure
  manual <code>              type the code instead
  zoom <level>               zoom the camera (while scanning)
  change                     discard the code and scan again
  save <brand>; <description>[; <YYYY-MM-DD>]
                             register the captured code as an item
  items [--expired|--valid] [search]
                             list registered items
  summary                    item counters
  status                     show the current session
  close                      close the scanner view
  help                       show this help
  quit                       exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Retry,
    Manual(String),
    Zoom(f64),
    Change,
    Save(NewItemForm),
    Items { filter: StatusFilter, search: String },
    Summary,
    Status,
    Close,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Whether the console loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parses console input lines into [`Command`]s.
pub struct CommandParser {
    /// `manual <code>`; the code keeps its inner spaces
    manual_pattern: Regex,
    /// `zoom <level>`
    zoom_pattern: Regex,
    /// `save <brand>; <description>[; <date>]`
    save_pattern: Regex,
    /// `items [--expired|--valid] [search]`
    items_pattern: Regex,
}

impl CommandParser {
    pub fn new() -> Self {
        Self {
            manual_pattern: Regex::new(r"^(?i:manual|m)(?:\s+(.*))?$").expect("Invalid manual regex"),
            zoom_pattern: Regex::new(r"^(?i:zoom)\s+([0-9]*\.?[0-9]+)x?$").expect("Invalid zoom regex"),
            save_pattern: Regex::new(r"^(?i:save)\s+([^;]*);([^;]*)(?:;([^;]*))?$")
                .expect("Invalid save regex"),
            items_pattern: Regex::new(r"^(?i:items)(?:\s+--(expired|valid))?(?:\s+(.+))?$")
                .expect("Invalid items regex"),
        }
    }

    pub fn parse(&self, line: &str) -> Result<Command, CommandError> {
        let line = line.trim();

        if let Some(caps) = self.manual_pattern.captures(line) {
            // Blank codes are passed through; the controller rejects them
            let code = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            return Ok(Command::Manual(code.to_string()));
        }

        if let Some(caps) = self.zoom_pattern.captures(line) {
            let level = caps[1]
                .parse::<f64>()
                .map_err(|_| CommandError::Usage("zoom <level>"))?;
            return Ok(Command::Zoom(level));
        }

        if let Some(caps) = self.save_pattern.captures(line) {
            let calibration_date = caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|date| !date.is_empty());
            return Ok(Command::Save(NewItemForm {
                brand: caps[1].trim().to_string(),
                description: caps[2].trim().to_string(),
                calibration_date,
                ..NewItemForm::default()
            }));
        }

        if let Some(caps) = self.items_pattern.captures(line) {
            let filter = match caps.get(1).map(|m| m.as_str()) {
                Some("expired") => StatusFilter::Expired,
                Some("valid") => StatusFilter::Valid,
                _ => StatusFilter::All,
            };
            let search = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            return Ok(Command::Items { filter, search });
        }

        let word = line.split_whitespace().next().unwrap_or_default();
        match word.to_lowercase().as_str() {
            "start" | "scan" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "retry" => Ok(Command::Retry),
            "change" => Ok(Command::Change),
            "summary" => Ok(Command::Summary),
            "status" => Ok(Command::Status),
            "close" => Ok(Command::Close),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "zoom" => Err(CommandError::Usage("zoom <level>")),
            "save" => Err(CommandError::Usage("save <brand>; <description>[; <YYYY-MM-DD>]")),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

/// One line describing a session event, or `None` for events the console
/// doesn't print.
pub fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged { to, .. } => match to {
            ScanState::Starting => Some("Opening camera...".to_string()),
            ScanState::Scanning => Some("Scanning. Point the camera at a barcode.".to_string()),
            ScanState::Stopped => Some("Scan stopped.".to_string()),
            _ => None,
        },
        SessionEvent::ScanComplete { code, source, .. } => {
            let origin = match source {
                CodeSource::Camera(symbology) => format!("camera, {}", symbology),
                CodeSource::Manual => "typed".to_string(),
            };
            Some(format!("Code read: {} ({})", code, origin))
        }
        SessionEvent::ScanFailed { error, .. } => {
            let options = if error.is_retryable() {
                "retry | manual <code>"
            } else {
                "manual <code>"
            };
            Some(format!("{} [{}]", error.user_message(), options))
        }
        SessionEvent::CapabilitiesKnown { capabilities } => {
            capabilities.zoom_range.map(|zoom| {
                format!(
                    "Zoom available: {:.1}x to {:.1}x (step {:.1})",
                    zoom.min, zoom.max, zoom.step
                )
            })
        }
        SessionEvent::AttemptsUpdated { .. } | SessionEvent::SessionReset => None,
    }
}

/// Terminal front-end over a [`ScanController`] and an [`ItemStore`].
pub struct Console {
    controller: Arc<ScanController>,
    store: Arc<dyn ItemStore>,
    user: Option<String>,
    request: ScanRequest,
    parser: CommandParser,
}

impl Console {
    /// # Arguments
    /// * `user` - Signed-in user recorded on saved items; saving fails without one
    pub fn new(
        controller: Arc<ScanController>,
        store: Arc<dyn ItemStore>,
        user: Option<String>,
    ) -> Self {
        Self {
            controller,
            store,
            user,
            request: ScanRequest::default(),
            parser: CommandParser::new(),
        }
    }

    /// Request used by `start` (facing mode and allowed symbologies).
    pub fn with_request(mut self, request: ScanRequest) -> Self {
        self.request = request;
        self
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// Run one command, writing its direct output to `out`.
    ///
    /// Session errors are reported to the user, not returned; only output
    /// failures are errors.
    pub fn execute(&self, command: Command, out: &mut impl Write) -> Result<Flow> {
        let controller = &self.controller;

        match command {
            Command::Start => {
                if let Err(e) = controller.start_session(self.request.clone()) {
                    writeln!(out, "{}", e.user_message())?;
                }
            }
            Command::Stop => {
                if !controller.stop_session() {
                    writeln!(out, "No scan is running.")?;
                }
            }
            Command::Retry => {
                if let Err(e) = controller.retry_session() {
                    writeln!(out, "{}", e.user_message())?;
                }
            }
            Command::Manual(text) => {
                if let Err(e) = controller.submit_manual_code(&text) {
                    writeln!(out, "{}", e.user_message())?;
                }
            }
            Command::Zoom(level) => {
                let zoom = controller.snapshot().capabilities.and_then(|c| c.zoom_range);
                match zoom {
                    Some(range) if controller.snapshot().state == ScanState::Scanning => {
                        controller.apply_zoom(level);
                        writeln!(out, "Zoom set to {:.1}x", range.clamp(level))?;
                    }
                    Some(_) => writeln!(out, "Zoom is only available while scanning.")?,
                    None => writeln!(out, "This camera has no zoom.")?,
                }
            }
            Command::Change => {
                if controller.snapshot().state != ScanState::Accepted {
                    writeln!(out, "There is no captured code to change.")?;
                } else if let Err(e) = controller.change_code() {
                    writeln!(out, "{}", e.user_message())?;
                }
            }
            Command::Save(form) => self.save(form, out)?,
            Command::Items { filter, search } => {
                let items = self.store.list();
                let now_ms = Local::now().timestamp_millis();
                let shown = inventory::filter_items(&items, &search, filter, now_ms);

                if shown.is_empty() {
                    writeln!(out, "No items.")?;
                }
                for item in shown {
                    writeln!(
                        out,
                        "{:<14} {:<16} {:<24} {:?}",
                        item.asset_code,
                        item.brand,
                        item.description,
                        item.calibration_status(now_ms)
                    )?;
                }
            }
            Command::Summary => {
                let summary = inventory::summarize(&self.store.list(), Local::now());
                writeln!(
                    out,
                    "{} items, {} with expired calibration, {} registered today",
                    summary.total, summary.expired, summary.created_today
                )?;
            }
            Command::Status => {
                let session = controller.snapshot();
                writeln!(out, "{}", session.summary())?;
                if let Some(capabilities) = session.capabilities {
                    writeln!(
                        out,
                        "camera: {} facing, zoom {}",
                        capabilities.facing_mode,
                        if capabilities.supports_zoom() { "yes" } else { "no" }
                    )?;
                }
            }
            Command::Close => controller.close(),
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }

        Ok(Flow::Continue)
    }

    fn save(&self, form: NewItemForm, out: &mut impl Write) -> Result<()> {
        let Some(code) = self.controller.snapshot().accepted_code else {
            writeln!(out, "Scan or type a code first.")?;
            return Ok(());
        };

        let item = match form.into_item(&code, self.user.as_deref(), Local::now()) {
            Ok(item) => item,
            Err(e) => {
                writeln!(out, "Not saved: {}", e)?;
                return Ok(());
            }
        };

        match self.store.create(item) {
            Ok(id) => {
                writeln!(out, "Saved {} as {}", code, id)?;
                self.controller.close();
            }
            Err(e) => writeln!(out, "Not saved: {}", e)?,
        }
        Ok(())
    }
}

/// Read commands from `input` until it ends or the user quits.
///
/// Session events are printed by a background task for as long as the loop
/// runs.
pub async fn run_console<R>(console: &Console, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut events = console.controller.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = describe_event(&event) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Console fell behind, {} session events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", HELP);

    let mut lines = input.lines();
    let stdout = std::io::stdout();

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read console input")?
    {
        if line.trim().is_empty() {
            continue;
        }

        let flow = match console.parser.parse(&line) {
            Ok(command) => {
                tracing::debug!("Console command: {:?}", command);
                console.execute(command, &mut stdout.lock())?
            }
            Err(e) => {
                println!("{}", e);
                Flow::Continue
            }
        };

        if flow == Flow::Quit {
            break;
        }
    }

    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AcceptedCode, SessionId, Symbology};
    use crate::services::ScanError;

    #[test]
    fn test_parse_simple_commands() {
        let parser = CommandParser::new();
        assert_eq!(parser.parse("start"), Ok(Command::Start));
        assert_eq!(parser.parse("  STOP "), Ok(Command::Stop));
        assert_eq!(parser.parse("retry"), Ok(Command::Retry));
        assert_eq!(parser.parse("quit"), Ok(Command::Quit));
        assert_eq!(parser.parse("?"), Ok(Command::Help));
    }

    #[test]
    fn test_parse_manual_keeps_inner_spaces() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("manual  PAT 0042 "),
            Ok(Command::Manual("PAT 0042".to_string()))
        );
        assert_eq!(parser.parse("manual"), Ok(Command::Manual(String::new())));
    }

    #[test]
    fn test_parse_zoom() {
        let parser = CommandParser::new();
        assert_eq!(parser.parse("zoom 1.5"), Ok(Command::Zoom(1.5)));
        assert_eq!(parser.parse("zoom 2x"), Ok(Command::Zoom(2.0)));
        assert_eq!(
            parser.parse("zoom max"),
            Err(CommandError::Usage("zoom <level>"))
        );
    }

    #[test]
    fn test_parse_save() {
        let parser = CommandParser::new();
        let command = parser.parse("save Fluke; Multimeter 87V; 2027-03-01").unwrap();

        let Command::Save(form) = command else {
            panic!("expected save");
        };
        assert_eq!(form.brand, "Fluke");
        assert_eq!(form.description, "Multimeter 87V");
        assert_eq!(form.calibration_date.as_deref(), Some("2027-03-01"));

        let Command::Save(form) = parser.parse("save Makita; Drill").unwrap() else {
            panic!("expected save");
        };
        assert!(form.calibration_date.is_none());
    }

    #[test]
    fn test_parse_items() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("items"),
            Ok(Command::Items {
                filter: StatusFilter::All,
                search: String::new()
            })
        );
        assert_eq!(
            parser.parse("items --expired fluke"),
            Ok(Command::Items {
                filter: StatusFilter::Expired,
                search: "fluke".to_string()
            })
        );
    }

    #[test]
    fn test_parse_unknown() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("teleport now"),
            Err(CommandError::Unknown("teleport".to_string()))
        );
    }

    #[test]
    fn test_describe_events() {
        let complete = SessionEvent::ScanComplete {
            session_id: SessionId::new(),
            code: AcceptedCode::parse("4006381333931").unwrap(),
            source: CodeSource::Camera(Symbology::Ean13),
        };
        let line = describe_event(&complete).unwrap();
        assert!(line.contains("4006381333931"));
        assert!(line.contains("camera"));

        let failed = SessionEvent::ScanFailed {
            session_id: None,
            error: ScanError::PermissionDenied,
        };
        assert!(describe_event(&failed).unwrap().contains("retry"));

        assert!(describe_event(&SessionEvent::SessionReset).is_none());
    }
}
