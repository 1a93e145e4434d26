use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

/// An argv-only subprocess description. There is deliberately no shell
/// string to interpret — every argument is passed to `exec` verbatim, so
/// shell metacharacters in a test name, path, or mod string can never be
/// reinterpreted as command syntax.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Option<HashMap<OsString, OsString>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let map = self.env.get_or_insert_with(HashMap::new);
        for (k, v) in vars {
            map.insert(k.into(), v.into());
        }
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn args_slice(&self) -> &[OsString] {
        &self.args
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        if let Some(env) = &self.env {
            for (k, v) in env {
                command.env(k, v);
            }
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_argv_without_shell_interpretation() {
        let spec = CommandSpec::new("case.submit")
            .arg("--skip-preview-namelist")
            .arg("--mail-user")
            .arg("a@b; rm -rf /");
        assert_eq!(spec.program(), "case.submit");
        assert_eq!(spec.args_slice().len(), 3);
        assert_eq!(spec.args_slice()[2], OsString::from("a@b; rm -rf /"));
    }

    #[test]
    fn env_overrides_are_applied() {
        let spec = CommandSpec::new("create_newcase.py")
            .env("FROM_CREATE_TEST", "True")
            .env("FROM_CREATE_TEST", "False");
        let command = spec.to_command();
        // We can't introspect std::process::Command's env directly; this
        // just ensures building the command doesn't panic with duplicate keys.
        drop(command);
    }
}
