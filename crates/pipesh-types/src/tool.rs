//! Builtin schema types, used for usage and help text.

/// Schema for a builtin parameter.
#[derive(Debug, Clone)]
pub struct ParamSchema {
    /// Parameter name, as written on the command line.
    pub name: String,
    /// Type hint (string, int, bool, signal, job).
    pub param_type: String,
    /// Whether this parameter is required.
    pub required: bool,
    /// Description for help text.
    pub description: String,
}

impl ParamSchema {
    /// Create a required parameter.
    pub fn required(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            description: description.into(),
        }
    }

    /// Create an optional parameter.
    pub fn optional(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: false,
            description: description.into(),
        }
    }
}

/// An example showing how to use a builtin.
#[derive(Debug, Clone)]
pub struct Example {
    /// Short description of what the example demonstrates.
    pub description: String,
    /// The example command line.
    pub code: String,
}

/// Schema describing a builtin's interface.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSchema>,
    pub examples: Vec<Example>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamSchema) -> Self {
        self.params.push(param);
        self
    }

    pub fn example(mut self, description: impl Into<String>, code: impl Into<String>) -> Self {
        self.examples.push(Example {
            description: description.into(),
            code: code.into(),
        });
        self
    }

    /// One-line usage string, e.g. `usage: kill [signal] <target>`.
    pub fn usage(&self) -> String {
        let mut line = format!("usage: {}", self.name);
        for p in &self.params {
            if p.required {
                line.push_str(&format!(" <{}>", p.name));
            } else {
                line.push_str(&format!(" [{}]", p.name));
            }
        }
        line
    }

    /// Full help text: description, usage, parameters and examples.
    pub fn help(&self) -> String {
        let mut out = format!("{} — {}\n\n{}\n", self.name, self.description, self.usage());
        if !self.params.is_empty() {
            out.push_str("\nParameters:\n");
            for p in &self.params {
                let req = if p.required { " (required)" } else { "" };
                out.push_str(&format!("  {} : {}{}\n    {}\n", p.name, p.param_type, req, p.description));
            }
        }
        if !self.examples.is_empty() {
            out.push_str("\nExamples:\n");
            for example in &self.examples {
                out.push_str(&format!("  # {}\n  {}\n", example.description, example.code));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_marks_required_params() {
        let schema = ToolSchema::new("kill", "Send a signal")
            .param(ParamSchema::optional("signal", "signal", "Signal name or number"))
            .param(ParamSchema::required("target", "job", "PID or %N"));
        assert_eq!(schema.usage(), "usage: kill [signal] <target>");
    }

    #[test]
    fn help_lists_params_and_examples() {
        let schema = ToolSchema::new("yes", "Print a line repeatedly")
            .param(ParamSchema::optional("words", "string", "Line to repeat"))
            .example("Answer every prompt", "yes | head -n 3");
        let help = schema.help();
        assert!(help.starts_with("yes — Print a line repeatedly\n\nusage: yes [words]\n"));
        assert!(help.contains("  words : string\n    Line to repeat\n"));
        assert!(help.contains("Examples:\n  # Answer every prompt\n  yes | head -n 3\n"));

        let bare = ToolSchema::new("pwd", "Print the working directory").help();
        assert!(!bare.contains("Parameters:"));
        assert!(!bare.contains("Examples:"));
    }
}
