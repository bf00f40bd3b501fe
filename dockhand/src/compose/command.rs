//! Compose command line construction

use tokio::process::Command;

use crate::compose::{ComposeProject, LogsOptions, RuntimeOptions};

/// One runtime invocation against a project
#[derive(Debug, Clone)]
pub struct ComposeCommand {
    binary: String,
    args: Vec<String>,
    subcommand: String,
    project: ComposeProject,
}

impl ComposeCommand {
    /// `<binary> [prefix...] --project-name <p> --file <f>... <subcommand>`
    pub fn new(options: &RuntimeOptions, project: &ComposeProject, subcommand: &str) -> Self {
        let mut args = options.subcommand.clone();
        args.push("--project-name".to_string());
        args.push(project.project_name.clone());
        for file in &project.compose_files {
            args.push("--file".to_string());
            args.push(file.clone());
        }
        args.push(subcommand.to_string());

        Self {
            binary: options.binary.clone(),
            args,
            subcommand: subcommand.to_string(),
            project: project.clone(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    /// Full argument vector after the binary
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Process builder with working directory and environment applied
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&self.args).current_dir(&self.project.working_dir);
        for assignment in &self.project.environment {
            if let Some((key, value)) = assignment.split_once('=') {
                command.env(key, value);
            }
        }
        command
    }
}

impl std::fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.binary, self.args.join(" "))
    }
}

pub fn create(options: &RuntimeOptions, project: &ComposeProject) -> ComposeCommand {
    ComposeCommand::new(options, project, "up").args(["--no-start", "--remove-orphans"])
}

pub fn start(options: &RuntimeOptions, project: &ComposeProject) -> ComposeCommand {
    ComposeCommand::new(options, project, "up").args(["--detach", "--remove-orphans"])
}

pub fn down(options: &RuntimeOptions, project: &ComposeProject, remove_volumes: bool) -> ComposeCommand {
    let command = ComposeCommand::new(options, project, "down");
    if remove_volumes {
        command.arg("--volumes")
    } else {
        command
    }
}

pub fn logs(
    options: &RuntimeOptions,
    project: &ComposeProject,
    logs: &LogsOptions,
) -> ComposeCommand {
    let mut command = ComposeCommand::new(options, project, "logs").arg("--no-color");
    if logs.follow {
        command = command.arg("--follow");
    }
    if let Some(tail) = logs.tail {
        command = command.args(["--tail".to_string(), tail.to_string()]);
    }
    if logs.timestamps {
        command = command.arg("--timestamps");
    }
    command.args(logs.services.iter().cloned())
}

pub fn config(options: &RuntimeOptions, project: &ComposeProject) -> ComposeCommand {
    ComposeCommand::new(options, project, "config").args(["--format", "json"])
}

pub fn status(options: &RuntimeOptions, project: &ComposeProject) -> ComposeCommand {
    ComposeCommand::new(options, project, "ps").args(["--all", "--format", "json"])
}
