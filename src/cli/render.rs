//! Terminal rendering of agent events.

use colored::*;
use datachat::agent::StreamEvent;

/// Text for one event in `--pretty` mode. Deltas are returned bare so they
/// can be printed without a trailing newline.
pub fn pretty(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Delta(text) => text.clone(),
        StreamEvent::Status(text) => format!("\n{}", text.yellow()),
        StreamEvent::Error(text) => format!("\n{} {}", "Error:".red().bold(), text.red()),
        StreamEvent::ToolCode(code) => {
            format!("\n{}\n{}", "Running code:".cyan().bold(), code.dimmed())
        }
        StreamEvent::ToolOutput(output) => {
            format!("{}\n{}", "Output:".cyan().bold(), output.trim_end())
        }
        StreamEvent::Artifact(reference) => format!("{} {}", "Artifact:".green().bold(), reference),
    }
}

pub fn is_inline(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::Delta(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_inline_and_bare() {
        colored::control::set_override(false);
        let event = StreamEvent::Delta("The total ".to_string());
        assert!(is_inline(&event));
        assert_eq!(pretty(&event), "The total ");
    }

    #[test]
    fn test_tool_output_labelled() {
        colored::control::set_override(false);
        let text = pretty(&StreamEvent::ToolOutput("42\n".to_string()));
        assert_eq!(text, "Output:\n42");
        assert!(!is_inline(&StreamEvent::ToolOutput(String::new())));
    }
}
