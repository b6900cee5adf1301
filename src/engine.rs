use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Instant;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineKind {
    #[default]
    Docker,
    Podman,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
        }
    }
}

impl FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "docker" => Ok(EngineKind::Docker),
            "podman" => Ok(EngineKind::Podman),
            other => Err(Error::UnsupportedEngine(other.to_owned())),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single engine invocation. Arguments are passed to the process as-is, never
/// through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl EngineCommand {
    fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Saves and loads images through the `docker` or `podman` CLI.
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    kind: EngineKind,
    program: OsString,
}

impl ContainerEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            program: kind.as_str().into(),
        }
    }

    /// Run a specific executable instead of looking up `docker`/`podman` on `PATH`.
    pub fn with_program<S: Into<OsString>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn save_command(&self, image: &str, output: &Path) -> EngineCommand {
        EngineCommand::new(&self.program)
            .arg("save")
            .arg(image)
            .arg("-o")
            .arg(output)
    }

    pub fn load_command(&self, input: &Path) -> EngineCommand {
        EngineCommand::new(&self.program)
            .arg("load")
            .arg("-i")
            .arg(input)
    }

    /// Write `image` to `output` as a single archive file.
    pub fn package_image(&self, image: &str, output: &Path) -> Result<PathBuf> {
        self.run(self.save_command(image, output))?;
        Ok(output.to_owned())
    }

    /// Load the archive at `input` into the engine's local image store.
    pub fn load_image(&self, input: &Path) -> Result<()> {
        if !input.exists() {
            return Err(Error::PathNotFound(input.to_owned()));
        }
        self.run(self.load_command(input))
    }

    fn run(&self, cmd: EngineCommand) -> Result<()> {
        tracing::debug!(engine = %self.kind, command = %cmd, "running engine command");
        let started = Instant::now();

        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                program: cmd.program().to_string_lossy().into_owned(),
                source,
            })?;

        tracing::debug!(
            engine = %self.kind,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine command finished"
        );

        // Engines report some failures on stderr while still exiting with 0.
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_owned();
        if output.status.success() && stderr.is_empty() {
            Ok(())
        } else {
            Err(Error::Engine {
                engine: self.kind.as_str(),
                command: cmd.to_string(),
                status: output.status,
                stderr,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write an executable shell script standing in for the engine CLI. Every call
    /// appends its arguments to `calls.log` next to the script.
    #[cfg(unix)]
    pub(crate) fn fake_engine(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-engine");
        let script = format!("#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/calls.log\"\n{body}\n");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A fake engine that writes the image name into the `save` output file.
    #[cfg(unix)]
    pub(crate) fn working_engine(dir: &Path) -> PathBuf {
        fake_engine(dir, r#"if [ "$1" = save ]; then echo "$2" > "$4"; fi"#)
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("docker".parse::<EngineKind>().unwrap(), EngineKind::Docker);
        assert_eq!("podman".parse::<EngineKind>().unwrap(), EngineKind::Podman);

        for name in ["containerd", "Docker", "", " docker"] {
            match name.parse::<EngineKind>() {
                Err(Error::UnsupportedEngine(n)) => assert_eq!(n, name),
                other => panic!("unexpected result for {name:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_command_templates() {
        let docker = ContainerEngine::new(EngineKind::Docker);
        let podman = ContainerEngine::new(EngineKind::Podman);
        let path = Path::new("/tmp/foo_latest");

        assert_eq!(
            docker.save_command("foo:latest", path).to_string(),
            "docker save foo:latest -o /tmp/foo_latest"
        );
        assert_eq!(
            podman.save_command("foo:latest", path).to_string(),
            "podman save foo:latest -o /tmp/foo_latest"
        );
        assert_eq!(docker.load_command(path).to_string(), "docker load -i /tmp/foo_latest");
        assert_eq!(podman.load_command(path).to_string(), "podman load -i /tmp/foo_latest");

        assert_eq!(docker.load_command(path).program(), OsStr::new("docker"));
        assert_eq!(podman.load_command(path).program(), OsStr::new("podman"));
    }

    #[test]
    fn test_with_program_keeps_kind() {
        let engine = ContainerEngine::new(EngineKind::Podman).with_program("/opt/bin/podman");
        assert_eq!(engine.kind(), EngineKind::Podman);
        assert_eq!(
            engine.load_command(Path::new("x")).to_string(),
            "/opt/bin/podman load -i x"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_load_missing_path_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ContainerEngine::new(EngineKind::Docker).with_program(working_engine(dir.path()));

        let missing = dir.path().join("missing");
        match engine.load_image(&missing) {
            Err(Error::PathNotFound(p)) => assert_eq!(p, missing),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!dir.path().join("calls.log").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_package_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ContainerEngine::new(EngineKind::Podman).with_program(working_engine(dir.path()));

        let output = dir.path().join("foo_latest");
        assert_eq!(engine.package_image("foo:latest", &output).unwrap(), output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "foo:latest\n");

        engine.load_image(&output).unwrap();

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let expected = format!(
            "save foo:latest -o {0}\nload -i {0}\n",
            output.display()
        );
        assert_eq!(calls, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ContainerEngine::new(EngineKind::Docker)
            .with_program(fake_engine(dir.path(), "echo 'no such image' >&2"));

        match engine.package_image("foo:latest", &dir.path().join("out")) {
            Err(Error::Engine { engine, stderr, status, .. }) => {
                assert_eq!(engine, "docker");
                assert_eq!(stderr, "no such image");
                assert!(status.success());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ContainerEngine::new(EngineKind::Docker).with_program(fake_engine(dir.path(), "exit 3"));

        let input = dir.path().join("calls.log");
        std::fs::write(&input, "").unwrap();
        match engine.load_image(&input) {
            Err(Error::Engine { status, stderr, command, .. }) => {
                assert_eq!(status.code(), Some(3));
                assert!(stderr.is_empty());
                assert!(command.ends_with(&format!("load -i {}", input.display())));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ContainerEngine::new(EngineKind::Docker).with_program(dir.path().join("no-such-docker"));

        match engine.package_image("foo", &dir.path().join("out")) {
            Err(Error::Spawn { program, .. }) => assert!(program.ends_with("no-such-docker")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
