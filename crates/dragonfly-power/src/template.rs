//! Argument-vector templates for backend commands
//!
//! Templates are split on whitespace into argv tokens once, at adapter
//! construction. The device target is substituted token-by-token, so a target
//! containing spaces or shell metacharacters stays a single argument.

use std::path::Path;

use crate::error::{PowerError, Result};

/// Placeholder replaced with the device target
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// A parsed command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    tokens: Vec<String>,
}

impl CommandTemplate {
    /// Parse a template, requiring at least one `{target}` placeholder
    pub fn parse(template: &str) -> Result<Self> {
        let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();

        if tokens.is_empty() {
            return Err(PowerError::config("command template is empty"));
        }
        if !tokens.iter().any(|t| t.contains(TARGET_PLACEHOLDER)) {
            return Err(PowerError::config(format!(
                "command template {:?} is missing the {} placeholder",
                template, TARGET_PLACEHOLDER
            )));
        }

        Ok(Self { tokens })
    }

    /// Render the template for a target
    pub fn render(&self, target: &str) -> Vec<String> {
        self.tokens
            .iter()
            .map(|t| t.replace(TARGET_PLACEHOLDER, target))
            .collect()
    }
}

/// First argv element for a configured tool path
///
/// Paths that are not valid UTF-8 are rejected rather than mangled, since a
/// lossy conversion would name a different file.
pub(crate) fn program_arg(path: &Path) -> Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        PowerError::config(format!("program path is not valid UTF-8: {:?}", path))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_target() {
        let template = CommandTemplate::parse("status {target}").unwrap();
        assert_eq!(template.render("14"), vec!["status", "14"]);
    }

    #[test]
    fn test_render_inside_token() {
        let template = CommandTemplate::parse("--device=dev-{target} on").unwrap();
        assert_eq!(template.render("3"), vec!["--device=dev-3", "on"]);
    }

    #[test]
    fn test_target_stays_one_argument() {
        let template = CommandTemplate::parse("ping -c1 {target}").unwrap();
        let argv = template.render("host; rm -rf /");
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[2], "host; rm -rf /");
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let err = CommandTemplate::parse("status").unwrap_err();
        assert!(matches!(err, PowerError::Config(ref msg) if msg.contains("{target}")));
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(CommandTemplate::parse("   ").is_err());
    }
}
