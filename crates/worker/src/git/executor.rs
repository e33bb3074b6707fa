use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

/// Which pipe of the child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Receives each output line as soon as the child writes it.
///
/// Called concurrently from the stdout and stderr readers.
pub type LineSink<'a> = &'a (dyn Fn(OutputStream, &str) + Sync);

pub trait CommandExecutor: Send + Sync {
    /// Run `program` to completion, forwarding every output line to
    /// `on_line` while it runs, then return the exit status and the full
    /// captured output.
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        on_line: LineSink<'_>,
    ) -> Result<CommandResult, io::Error>;
}

#[derive(Debug, Default, Clone)]
pub struct ProcessCommandExecutor {
    envs: Vec<(String, String)>,
}

impl ProcessCommandExecutor {
    /// An executor whose git children fail instead of prompting for
    /// credentials on a terminal.
    pub fn non_interactive() -> Self {
        Self::default().with_env("GIT_TERMINAL_PROMPT", "0")
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        on_line: LineSink<'_>,
    ) -> Result<CommandResult, io::Error> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .envs(self.envs.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_pipe =
            child.stdout.take().ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let stderr_pipe =
            child.stderr.take().ok_or_else(|| io::Error::other("child stderr was not captured"))?;

        // Blocks until the child closes both pipes.
        let (stdout, stderr) = std::thread::scope(|scope| {
            let stderr_reader =
                scope.spawn(|| drain_lines(stderr_pipe, OutputStream::Stderr, on_line));
            let stdout = drain_lines(stdout_pipe, OutputStream::Stdout, on_line);
            let stderr = stderr_reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
            (stdout, stderr)
        });

        let status = child.wait()?;
        Ok(CommandResult {
            success: status.success(),
            code: status.code(),
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

fn drain_lines(
    pipe: impl Read,
    stream: OutputStream,
    on_line: LineSink<'_>,
) -> Result<String, io::Error> {
    let mut reader = BufReader::new(pipe);
    let mut captured = String::new();
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(captured);
        }
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim_end_matches(['\n', '\r']);
        on_line(stream, line);
        captured.push_str(line);
        captured.push('\n');
    }
}
