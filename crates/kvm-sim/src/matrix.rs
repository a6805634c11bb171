//! Virtual Blustream matrix
//!
//! Reproduces the console behavior of a CMX44AB-class matrix: a `STATUS`
//! query prints the fenced multi-line dump, an `OUT<o>FR<i>` command moves a
//! route and confirms with a `[SUCCESS]` line. State is mutable from tests
//! (sources coming online, a device that stops confirming) so driver
//! behavior can be exercised without hardware.

use tracing::debug;

/// A simulated matrix input
#[derive(Debug, Clone)]
struct SimInput {
    identity: String,
    connected: bool,
}

/// A simulated Blustream matrix switch
#[derive(Debug)]
pub struct VirtualMatrix {
    /// Panel name as printed in the status dump, e.g. "CMX44AB"
    model: String,
    firmware: String,
    inputs: Vec<SimInput>,
    /// 1-based input index routed to each output
    routes: Vec<usize>,
    /// When false, routing commands are applied but never confirmed,
    /// simulating a device that stops answering
    confirm_swaps: bool,
    /// When true, every line is prefixed with the console echo `<model>> `
    echo_prefix: bool,
    received: Vec<String>,
}

impl VirtualMatrix {
    /// Create a matrix with the given port counts; all inputs connected,
    /// output N routed from input N
    pub fn new(
        model: impl Into<String>,
        firmware: impl Into<String>,
        num_inputs: usize,
        num_outputs: usize,
    ) -> Self {
        Self {
            model: model.into(),
            firmware: firmware.into(),
            inputs: (0..num_inputs)
                .map(|_| SimInput {
                    identity: "Force___11".to_string(),
                    connected: true,
                })
                .collect(),
            routes: (1..=num_outputs).collect(),
            confirm_swaps: true,
            echo_prefix: false,
            received: Vec::new(),
        }
    }

    /// The 4x4 matrix the original system ran on
    pub fn cmx44ab() -> Self {
        Self::new("CMX44AB", "1.08", 4, 4)
    }

    /// Stop confirming routing commands (they still apply)
    pub fn set_confirm_swaps(&mut self, confirm: bool) {
        self.confirm_swaps = confirm;
    }

    /// Prefix every reply line with the console echo `<model>> `
    pub fn set_echo_prefix(&mut self, echo: bool) {
        self.echo_prefix = echo;
    }

    /// Mark an input as having a source connected or not (1-based)
    pub fn set_input_connected(&mut self, index: usize, connected: bool) {
        if let Some(input) = self.inputs.get_mut(index - 1) {
            input.connected = connected;
        }
    }

    /// Input currently routed to an output (1-based)
    pub fn route(&self, output: usize) -> Option<usize> {
        self.routes.get(output - 1).copied()
    }

    /// Every command line the matrix has received
    pub fn received_commands(&self) -> &[String] {
        &self.received
    }

    /// Process one command line and return the reply lines
    pub fn process_command(&mut self, line: &str) -> Vec<String> {
        self.received.push(line.to_string());
        debug!(command = line, "virtual matrix command");

        let replies = if line == "STATUS" {
            self.status_dump()
        } else if let Some(route) = parse_route_command(line) {
            self.apply_route(route)
        } else {
            // Real hardware grumbles about unknown commands; nothing we
            // send should reach this.
            vec!["[FAIL]Unknown command.".to_string()]
        };

        if self.echo_prefix {
            replies
                .into_iter()
                .map(|reply| format!("{}> {}", self.model, reply))
                .collect()
        } else {
            replies
        }
    }

    fn apply_route(&mut self, (output, input): (usize, usize)) -> Vec<String> {
        if output == 0 || output > self.routes.len() || input == 0 || input > self.inputs.len() {
            return vec!["[FAIL]Output or input out of range.".to_string()];
        }
        self.routes[output - 1] = input;
        if !self.confirm_swaps {
            return Vec::new();
        }
        vec![format!(
            "[SUCCESS]Set output {output:02} connect from input {input:02}."
        )]
    }

    /// The fenced multi-line STATUS dump, echo line included
    fn status_dump(&self) -> Vec<String> {
        let mut lines = vec![
            "STATUS".to_string(),
            "================================================".to_string(),
            format!("            HDMI {} Status", self.model),
            format!("FW Version  : {}", self.firmware),
            "Input   Edid         HDMIcon".to_string(),
        ];
        for (i, input) in self.inputs.iter().enumerate() {
            lines.push(format!(
                "{:02}      {:<12} {}",
                i + 1,
                input.identity,
                on_off(input.connected)
            ));
        }
        lines.push("Output  FromIn       HDMIcon   OutputEn    OSP   Mute".to_string());
        for (o, &from) in self.routes.iter().enumerate() {
            let connected = self
                .inputs
                .get(from - 1)
                .map(|input| input.connected)
                .unwrap_or(false);
            lines.push(format!(
                "{:02}      {:02}           {:<9} Yes         SNK   Off",
                o + 1,
                from,
                on_off(connected)
            ));
        }
        lines.push("================================================".to_string());
        lines
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}

/// Parse `OUT<o>FR<i>` into (output, input)
fn parse_route_command(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("OUT")?;
    let at = rest.find("FR")?;
    let output = rest[..at].parse().ok()?;
    let input = rest[at + 2..].parse().ok()?;
    Some((output, input))
}
