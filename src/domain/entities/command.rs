/// Command keyword plus argument tokens recognised in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: String,
    pub arguments: Vec<String>,
}

impl ParsedCommand {
    pub fn new(command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            command: command.into(),
            arguments,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(String::as_str)
    }

    pub fn has_args(&self, count: usize) -> bool {
        self.arguments.len() >= count
    }

    /// Arguments glued back together without separators
    pub fn joined_args(&self) -> String {
        self.arguments.concat()
    }
}

/// Who may invoke a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    #[default]
    Anyone,
    Supervisor,
    SupervisorOrSub,
}
