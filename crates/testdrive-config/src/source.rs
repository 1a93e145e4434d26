use std::fmt;

/// Where a resolved configuration field's value came from, in descending
/// precedence order: explicit CLI flag, config file, environment variable,
/// built-in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cli,
    File,
    Env,
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Cli => "cli",
            Source::File => "file",
            Source::Env => "env",
            Source::Default => "default",
        };
        f.write_str(s)
    }
}

/// Pick the highest-precedence `Some` among `cli`/`file`/`env`, falling
/// back to `default`, and report which layer won.
pub(crate) fn pick<T>(cli: Option<T>, file: Option<T>, env: Option<T>, default: T) -> (T, Source) {
    if let Some(v) = cli {
        return (v, Source::Cli);
    }
    if let Some(v) = file {
        return (v, Source::File);
    }
    if let Some(v) = env {
        return (v, Source::Env);
    }
    (default, Source::Default)
}
