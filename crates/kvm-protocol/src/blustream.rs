//! Blustream matrix protocol
//!
//! Developed against a CMX44AB 4x4 HDMI matrix; other Blustream matrices
//! speak the same console protocol. Commands are ASCII lines terminated by
//! CRLF. The interesting part is the `STATUS` dump: a multi-line report whose
//! sections must be read in order, tracked by [`StatusPhase`].
//!
//! ```text
//! STATUS
//! ================================================
//!             HDMI CMX44AB Status
//! FW Version  : 1.08
//! Input   Edid         HDMIcon
//! 01      Force___11   On
//! 02      Force___11   Off
//! Output  FromIn       HDMIcon   OutputEn    OSP   Mute
//! 01      02           On        Yes         SNK   Off
//! 02      01           On        Yes         SNK   Off
//! ================================================
//! ```
//!
//! Outside a status dump the device sends unsolicited confirmation lines
//! (`[SUCCESS]Set output 01 connect from input 02.`) when a routing change
//! completes, and may prefix any line with an echo of its own model name
//! (`CMX44AB> ...`).

use tracing::{debug, trace};

use crate::error::ParseError;
use crate::port::{is_active, InputPort, OutputPort};

/// Query that makes the device print a full status dump
pub const STATUS_QUERY: &str = "STATUS";

/// Prefix of unsolicited confirmation lines
const CONFIRM_PREFIX: &str = "[SUCCESS]";

/// Marker identifying the model line of a status dump
const MODEL_MARKER: &str = "Status";

/// Marker identifying the firmware line of a status dump
const VERSION_MARKER: &str = "Version";

/// Compose the routing command connecting `output` to `input`
///
/// Port names are the zero-padded strings the device prints, so they pass
/// through verbatim: `switch_command("01", "03")` is `OUT01FR03`.
pub fn switch_command(output: &str, input: &str) -> String {
    format!("OUT{output}FR{input}")
}

/// Where the state machine is while reading a `STATUS` dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPhase {
    /// Waiting for the model line
    #[default]
    ReadingModel,
    /// Waiting for the firmware version line
    ReadingVersion,
    /// Waiting for the input table header
    WaitingInput,
    /// Consuming input table rows
    ReadingInput,
    /// Consuming output table rows
    ReadingOutput,
}

/// Events surfaced to the driver while lines are consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixEvent {
    /// Model and firmware are both known; `name` is "<model> v<version>"
    ModelIdentified {
        /// Display name for the device
        name: String,
    },
    /// An input row created a port or changed its activity/identity
    InputChanged {
        /// 1-based table index of the port
        index: usize,
    },
    /// An output row created a port or changed its state
    OutputChanged {
        /// 1-based table index of the port
        index: usize,
    },
    /// A routing change was confirmed by the device
    SwapConfirmed {
        /// Output port name from the confirmation line
        output: String,
        /// Input port name from the confirmation line
        input: String,
    },
    /// The closing fence of a status dump was consumed
    StatusComplete,
}

/// Streaming state machine for Blustream matrix console output
#[derive(Debug, Default)]
pub struct MatrixState {
    /// Display model, e.g. "Blustream CMX44AB"
    model: Option<String>,
    /// Raw panel name used in echoed-line prefixes, e.g. "CMX44AB"
    panel_name: Option<String>,
    firmware: Option<String>,
    name_reported: bool,

    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,

    phase: StatusPhase,
    /// A status query was issued and its dump has not finished
    status_pending: bool,
    /// The `STATUS` echo arrived; dump lines are expected
    in_status_block: bool,
    /// Inside the `==` fences that bracket the dump body
    fence_open: bool,

    next_input_row: usize,
    next_output_row: usize,
}

impl MatrixState {
    /// Create a state machine with empty port tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the machine for a fresh `STATUS` dump
    ///
    /// Must be called whenever the status query is written to the device;
    /// this is the only thing that resets the parse phase.
    pub fn begin_status(&mut self) {
        self.status_pending = true;
        self.in_status_block = false;
        self.fence_open = false;
        self.phase = StatusPhase::ReadingModel;
    }

    /// Current parse phase
    pub fn phase(&self) -> StatusPhase {
        self.phase
    }

    /// Display name once both model and firmware are known
    pub fn display_name(&self) -> Option<String> {
        match (&self.model, &self.firmware) {
            (Some(model), Some(version)) => Some(format!("{model} v{version}")),
            _ => None,
        }
    }

    /// Known input ports, in table order
    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    /// Known output ports, in table order
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    /// Look up an input port by name
    pub fn find_input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Look up an output port by name
    pub fn find_output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|output| output.name == name)
    }

    /// Consume one reassembled line of device output
    ///
    /// Malformed lines are dropped without an event; the tables only grow or
    /// update in place, so replaying a dump is idempotent.
    pub fn process_line(&mut self, raw: &str) -> Option<MatrixEvent> {
        let msg = self.strip_echo_prefix(raw).trim();
        trace!(line = msg, "matrix line");

        if self.status_pending && msg == STATUS_QUERY {
            self.in_status_block = true;
            self.fence_open = false;
            self.phase = StatusPhase::ReadingModel;
            return None;
        }

        if self.in_status_block && msg.len() > 2 {
            if msg.starts_with("==") {
                return self.cross_fence();
            }
            return self.read_status_row(msg);
        }

        if let Some(rest) = msg.strip_prefix(CONFIRM_PREFIX) {
            return match Self::parse_confirmation(rest) {
                Ok((output, input)) => Some(MatrixEvent::SwapConfirmed { output, input }),
                Err(err) => {
                    debug!(%err, "ignoring confirmation-shaped line");
                    None
                }
            };
        }

        None
    }

    /// Strip an echoed `<panel>> ` prefix when the panel name is known
    fn strip_echo_prefix<'a>(&self, raw: &'a str) -> &'a str {
        if let Some(panel) = &self.panel_name {
            if let Some((head, rest)) = raw.split_once("> ") {
                if head == panel {
                    return rest;
                }
            }
        }
        raw
    }

    /// Handle a `==` fence line; the first opens the dump body, the second
    /// ends the status cycle
    fn cross_fence(&mut self) -> Option<MatrixEvent> {
        if !self.fence_open {
            self.fence_open = true;
            return None;
        }
        self.fence_open = false;
        self.in_status_block = false;
        self.status_pending = false;
        Some(MatrixEvent::StatusComplete)
    }

    fn read_status_row(&mut self, msg: &str) -> Option<MatrixEvent> {
        match self.phase {
            StatusPhase::ReadingModel => {
                if let Some(at) = msg.find(MODEL_MARKER) {
                    self.set_model(&msg[..at]);
                    self.phase = StatusPhase::ReadingVersion;
                }
                None
            }
            StatusPhase::ReadingVersion => {
                if msg.contains(VERSION_MARKER) {
                    if let Some((_, version)) = msg.split_once(": ") {
                        self.firmware = Some(version.trim().to_string());
                    }
                    self.phase = StatusPhase::WaitingInput;
                    return self.report_name();
                }
                None
            }
            StatusPhase::WaitingInput => {
                if first_field_is(msg, "INPUT") {
                    self.phase = StatusPhase::ReadingInput;
                    self.next_input_row = 1;
                }
                None
            }
            StatusPhase::ReadingInput => {
                if first_field_is(msg, "OUTPUT") {
                    // Input table is complete; its length is frozen until the
                    // next status cycle grows it again.
                    self.phase = StatusPhase::ReadingOutput;
                    self.next_output_row = 1;
                    return None;
                }
                match self.read_input_row(msg) {
                    Ok(event) => event,
                    Err(err) => {
                        debug!(%err, row = msg, "dropping input row");
                        None
                    }
                }
            }
            StatusPhase::ReadingOutput => match self.read_output_row(msg) {
                Ok(event) => event,
                Err(err) => {
                    debug!(%err, row = msg, "dropping output row");
                    None
                }
            },
        }
    }

    /// Record the model from the text preceding the `Status` marker
    ///
    /// The panel prints e.g. "HDMI CMX44AB Status"; the bare panel name
    /// ("CMX44AB") is kept separately because echoed lines use it.
    fn set_model(&mut self, prefix: &str) {
        let mut name = prefix.trim().to_string();
        if let Some(stripped) = name.strip_prefix("HDMI ") {
            name = stripped.to_string();
        }
        let model = if name.contains("Blustream") {
            name.clone()
        } else {
            format!("Blustream {name}")
        };
        self.panel_name = Some(name);
        self.model = Some(model);
    }

    /// Emit `ModelIdentified` once, the first time the full name is known
    fn report_name(&mut self) -> Option<MatrixEvent> {
        if self.name_reported {
            return None;
        }
        let name = self.display_name()?;
        self.name_reported = true;
        Some(MatrixEvent::ModelIdentified { name })
    }

    fn read_input_row(&mut self, msg: &str) -> Result<Option<MatrixEvent>, ParseError> {
        let fields: Vec<&str> = msg.split_whitespace().collect();
        let index = parse_row_index(&fields, self.next_input_row)?;
        if fields.len() != 3 {
            return Err(ParseError::InvalidRow {
                expected: 3,
                row: msg.to_string(),
            });
        }

        let identity = fields[1];
        let active = is_active(fields[2]);
        self.next_input_row += 1;

        if self.inputs.len() < index {
            self.inputs.push(InputPort {
                name: fields[0].to_string(),
                active,
                identity: identity.to_string(),
            });
            return Ok(Some(MatrixEvent::InputChanged { index }));
        }

        let input = &mut self.inputs[index - 1];
        let changed = input.active != active || input.identity != identity;
        input.active = active;
        input.identity = identity.to_string();
        Ok(changed.then_some(MatrixEvent::InputChanged { index }))
    }

    fn read_output_row(&mut self, msg: &str) -> Result<Option<MatrixEvent>, ParseError> {
        let fields: Vec<&str> = msg.split_whitespace().collect();
        let index = parse_row_index(&fields, self.next_output_row)?;
        if fields.len() != 6 {
            return Err(ParseError::InvalidRow {
                expected: 6,
                row: msg.to_string(),
            });
        }

        let source = fields[1];
        let active = is_active(fields[2]) && is_active(fields[3]);
        let identity = fields[4];
        let muted = is_active(fields[5]);
        self.next_output_row += 1;

        if self.outputs.len() < index {
            self.outputs.push(OutputPort {
                name: fields[0].to_string(),
                active,
                source: source.to_string(),
                identity: identity.to_string(),
                muted,
            });
            return Ok(Some(MatrixEvent::OutputChanged { index }));
        }

        let output = &mut self.outputs[index - 1];
        let changed = output.active != active
            || output.source != source
            || output.identity != identity
            || output.muted != muted;
        output.active = active;
        output.source = source.to_string();
        output.identity = identity.to_string();
        output.muted = muted;
        Ok(changed.then_some(MatrixEvent::OutputChanged { index }))
    }

    /// Parse the body of a `[SUCCESS]` line
    ///
    /// Only `Set output <N> connect from input <M>` counts as a swap
    /// confirmation; the device emits other `[SUCCESS]` lines we ignore.
    fn parse_confirmation(rest: &str) -> Result<(String, String), ParseError> {
        let body = rest.trim().trim_end_matches('.');
        let fields: Vec<&str> = body.split_whitespace().collect();

        let shape_ok = fields.len() == 7
            && fields[0] == "Set"
            && fields[1] == "output"
            && fields[3] == "connect"
            && fields[4] == "from"
            && fields[5] == "input";
        if !shape_ok {
            return Err(ParseError::MalformedConfirmation(body.to_string()));
        }

        let output = fields[2];
        let input = fields[6];
        if !is_port_number(output) || !is_port_number(input) {
            return Err(ParseError::MalformedConfirmation(body.to_string()));
        }

        Ok((output.to_string(), input.to_string()))
    }
}

/// True when the first whitespace field equals `expected`, case-insensitively
fn first_field_is(msg: &str, expected: &str) -> bool {
    msg.split_whitespace()
        .next()
        .is_some_and(|field| field.eq_ignore_ascii_case(expected))
}

fn is_port_number(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit())
}

/// Parse and sequence-check the leading index of a table row
fn parse_row_index(fields: &[&str], expected: usize) -> Result<usize, ParseError> {
    let first = fields
        .first()
        .ok_or_else(|| ParseError::InvalidIndex(String::new()))?;
    let index: usize = first
        .parse()
        .map_err(|_| ParseError::InvalidIndex(first.to_string()))?;
    if index != expected {
        return Err(ParseError::RowOutOfSequence {
            expected,
            actual: index,
        });
    }
    Ok(index)
}
