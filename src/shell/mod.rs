//! Application tasks run from the command line.
//!
//! Arguments are passed through positionally: `poly-cli task <name> [args...]`.

use std::collections::BTreeMap;

/// Exit code when a task is missing required arguments.
pub const MISSING_ARGS: i32 = 1;
/// Exit code for an unknown task.
pub const TASK_NOT_FOUND: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("missing argument: {0}")]
    MissingArgs(String),

    #[error("unknown task '{0}'")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

impl ShellError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::NotFound(_) => TASK_NOT_FOUND,
            ShellError::MissingArgs(_) | ShellError::Failed(_) => MISSING_ARGS,
        }
    }
}

/// Positional task arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<String>);

impl Args {
    pub fn new<S: Into<String>>(args: impl IntoIterator<Item = S>) -> Self {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Argument at `index`, or `MissingArgs` naming it.
    pub fn require(&self, index: usize, name: &str) -> Result<&str, ShellError> {
        self.get(index).ok_or_else(|| ShellError::MissingArgs(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

pub trait Task: Send + Sync {
    fn run(&self, args: &Args) -> Result<(), ShellError>;
}

impl<F> Task for F
where
    F: Fn(&Args) -> Result<(), ShellError> + Send + Sync,
{
    fn run(&self, args: &Args) -> Result<(), ShellError> {
        self(args)
    }
}

/// Named tasks.
#[derive(Default)]
pub struct Tasks {
    tasks: BTreeMap<String, Box<dyn Task>>,
}

impl Tasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, task: impl Task + 'static) -> &mut Self {
        self.tasks.insert(name.to_string(), Box::new(task));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Run the task named by the first argument with the rest.
    pub fn run(&self, argv: &[String]) -> Result<(), ShellError> {
        let (name, rest) = argv
            .split_first()
            .ok_or_else(|| ShellError::MissingArgs("task".to_string()))?;
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| ShellError::NotFound(name.clone()))?;
        tracing::info!(task = %name, args = rest.len(), "Running task");
        task.run(&Args::new(rest.iter().cloned()))
    }

    /// Like [`Tasks::run`] but reports errors on stderr and returns the
    /// process exit code.
    pub fn exit_code(&self, argv: &[String]) -> i32 {
        match self.run(argv) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}", e);
                e.exit_code()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_runs_task_with_positional_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut tasks = Tasks::new();
        tasks.register("greet", move |args: &Args| -> Result<(), ShellError> {
            let name = args.require(0, "name")?;
            sink.lock().unwrap().push(name.to_string());
            Ok(())
        });

        assert_eq!(tasks.exit_code(&argv(&["greet", "ana", "extra"])), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["ana".to_string()]);
        assert_eq!(tasks.exit_code(&argv(&["greet"])), MISSING_ARGS);
        assert_eq!(tasks.exit_code(&argv(&["nope"])), TASK_NOT_FOUND);
        assert_eq!(tasks.exit_code(&[]), MISSING_ARGS);
    }
}
