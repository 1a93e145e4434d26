use std::fmt;

use testdrive_error::TestIdError;

/// A single parsed `opts` code, per the closed tagged-variant set named in
/// the design notes. The scheduler consumes `P`, `N`, `C`, `M`, `V`, `B`
/// directly; the rest flow through to the per-case XML phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opt {
    /// `D` — debug build.
    Debug,
    /// `E` — use ESMF.
    Esmf,
    /// `CG` — Gregorian calendar.
    GregorianCalendar,
    /// `L<unit><n>` — stop option unit and count.
    StopOption { unit: char, n: u32 },
    /// `R` — single-point mode.
    SinglePoint,
    /// `A<cpl>[x<stride>]` — async I/O coupling interval and optional stride.
    AsyncIo { cpl: u32, stride: Option<u32> },
    /// `P<procs>[x<threads>]` — forced process (and optional thread) count.
    Procs { procs: u32, threads: Option<u32> },
    /// `M<mpilib>` — MPI library override.
    Mpilib(String),
    /// `N<n>` — instance count.
    Ninst(u32),
    /// `C<n>` — coupling interval count.
    Ncpl(u32),
    /// `V<driver>` — driver override.
    Driver(String),
    /// `B` — build-and-submit-only; RUN phase is short-circuited.
    BuildOnly,
    /// `I` — undocumented legacy code, passed through verbatim.
    I,
    /// `IOP` — accepted but unimplemented; callers should log a warning.
    Iop,
    /// `G` — generate a baseline.
    GenerateBaseline,
}

impl Opt {
    /// Parse a single underscore-delimited opt token, e.g. `"P16x2"`, `"Ln9"`, `"CG"`.
    pub fn parse(token: &str, test_name: &str) -> Result<Opt, TestIdError> {
        if token == "CG" {
            return Ok(Opt::GregorianCalendar);
        }
        if token.starts_with("IOP") {
            return Ok(Opt::Iop);
        }
        if token == "D" {
            return Ok(Opt::Debug);
        }
        if token == "E" {
            return Ok(Opt::Esmf);
        }
        if token == "R" {
            return Ok(Opt::SinglePoint);
        }
        if token == "B" {
            return Ok(Opt::BuildOnly);
        }
        if token == "G" {
            return Ok(Opt::GenerateBaseline);
        }
        if token == "I" {
            return Ok(Opt::I);
        }

        let mut chars = token.chars();
        let tag = chars.next().ok_or_else(|| TestIdError::Malformed {
            name: test_name.to_string(),
            reason: "empty opt token".to_string(),
        })?;
        let rest: String = chars.collect();

        match tag {
            'L' => {
                let mut r = rest.chars();
                let unit = r.next().ok_or_else(|| TestIdError::Malformed {
                    name: test_name.to_string(),
                    reason: format!("opt `{token}` is missing a stop-option unit"),
                })?;
                let n: String = r.collect();
                let n: u32 = n.parse().map_err(|_| TestIdError::Malformed {
                    name: test_name.to_string(),
                    reason: format!("opt `{token}` has a non-numeric stop count"),
                })?;
                Ok(Opt::StopOption { unit, n })
            }
            'A' => {
                let (cpl, stride) = split_count_and_stride(&rest, token, test_name)?;
                Ok(Opt::AsyncIo { cpl, stride })
            }
            'P' => {
                let (procs, threads) = split_count_and_stride(&rest, token, test_name)?;
                Ok(Opt::Procs { procs, threads })
            }
            'M' => Ok(Opt::Mpilib(rest)),
            'N' => {
                let n: u32 = rest.parse().map_err(|_| TestIdError::Malformed {
                    name: test_name.to_string(),
                    reason: format!("opt `{token}` has a non-numeric instance count"),
                })?;
                Ok(Opt::Ninst(n))
            }
            'C' => {
                let n: u32 = rest.parse().map_err(|_| TestIdError::Malformed {
                    name: test_name.to_string(),
                    reason: format!("opt `{token}` has a non-numeric coupling count"),
                })?;
                Ok(Opt::Ncpl(n))
            }
            'V' => Ok(Opt::Driver(rest)),
            _ => Err(TestIdError::UnknownOpt {
                name: test_name.to_string(),
                code: token.to_string(),
            }),
        }
    }
}

fn split_count_and_stride(
    rest: &str,
    token: &str,
    test_name: &str,
) -> Result<(u32, Option<u32>), TestIdError> {
    let bad = || TestIdError::Malformed {
        name: test_name.to_string(),
        reason: format!("opt `{token}` has a non-numeric count"),
    };
    match rest.split_once('x') {
        Some((count, stride)) => {
            let count: u32 = count.parse().map_err(|_| bad())?;
            let stride: u32 = stride.parse().map_err(|_| bad())?;
            Ok((count, Some(stride)))
        }
        None => {
            let count: u32 = rest.parse().map_err(|_| bad())?;
            Ok((count, None))
        }
    }
}

/// A fully parsed test identifier: `{case, opts?, grid, compset, machine?,
/// compiler?, mods?}` with a canonical string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestId {
    pub case: String,
    pub opts: Vec<Opt>,
    pub grid: String,
    pub compset: String,
    pub machine: Option<String>,
    pub compiler: Option<String>,
    pub mods: Option<String>,
}

impl TestId {
    /// Parse the dot-separated canonical test name:
    /// `CASE[_OPT]*.GRID.COMPSET[.MACHINE_COMPILER][.MODS]`
    pub fn parse(name: &str) -> Result<TestId, TestIdError> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() < 3 {
            return Err(TestIdError::Malformed {
                name: name.to_string(),
                reason: "expected at least CASE.GRID.COMPSET".to_string(),
            });
        }

        let mut case_tokens = parts[0].split('_');
        let case = case_tokens
            .next()
            .ok_or_else(|| TestIdError::Malformed {
                name: name.to_string(),
                reason: "empty case segment".to_string(),
            })?
            .to_string();

        let mut opts = Vec::new();
        for token in case_tokens {
            opts.push(Opt::parse(token, name)?);
        }

        let grid = parts[1].to_string();
        let compset = parts[2].to_string();

        let (machine, compiler) = match parts.get(3) {
            Some(seg) => match seg.split_once('_') {
                Some((m, c)) => (Some(m.to_string()), Some(c.to_string())),
                None => (Some(seg.to_string()), None),
            },
            None => (None, None),
        };
        let mods = parts.get(4).map(|s| s.to_string());

        let parsed = TestId {
            case,
            opts,
            grid,
            compset,
            machine,
            compiler,
            mods,
        };
        parsed.validate(name)?;
        Ok(parsed)
    }

    /// §9 / §3: `N` and `C` are mutually exclusive; `N` is rejected under the
    /// `nuopc` driver.
    fn validate(&self, name: &str) -> Result<(), TestIdError> {
        let has_n = self.opts.iter().any(|o| matches!(o, Opt::Ninst(_)));
        let has_c = self.opts.iter().any(|o| matches!(o, Opt::Ncpl(_)));
        if has_n && has_c {
            return Err(TestIdError::ConflictingInstanceCount {
                name: name.to_string(),
            });
        }
        let driver = self.opts.iter().find_map(|o| match o {
            Opt::Driver(d) => Some(d.as_str()),
            _ => None,
        });
        if has_n && driver == Some("nuopc") {
            return Err(TestIdError::NInstWithNuopc {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn procs_opt(&self) -> Option<(u32, Option<u32>)> {
        self.opts.iter().find_map(|o| match o {
            Opt::Procs { procs, threads } => Some((*procs, *threads)),
            _ => None,
        })
    }

    pub fn mpilib_opt(&self) -> Option<&str> {
        self.opts.iter().find_map(|o| match o {
            Opt::Mpilib(m) => Some(m.as_str()),
            _ => None,
        })
    }

    pub fn driver_opt(&self) -> Option<&str> {
        self.opts.iter().find_map(|o| match o {
            Opt::Driver(d) => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn has_opt(&self, predicate: impl Fn(&Opt) -> bool) -> bool {
        self.opts.iter().any(predicate)
    }

    /// Rewrite (or append) the `P` opt to force a given proc/thread count,
    /// per the `force_procs` / `force_threads` configuration inputs (§6).
    pub fn with_forced_procs(&self, procs: u32, threads: Option<u32>) -> TestId {
        let mut opts: Vec<Opt> = self
            .opts
            .iter()
            .filter(|o| !matches!(o, Opt::Procs { .. }))
            .cloned()
            .collect();
        opts.push(Opt::Procs { procs, threads });
        TestId {
            opts,
            ..self.clone()
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.case)?;
        for opt in &self.opts {
            write!(f, "_{}", format_opt(opt))?;
        }
        write!(f, ".{}.{}", self.grid, self.compset)?;
        if let Some(machine) = &self.machine {
            write!(f, ".{machine}")?;
            if let Some(compiler) = &self.compiler {
                write!(f, "_{compiler}")?;
            }
        }
        if let Some(mods) = &self.mods {
            write!(f, ".{mods}")?;
        }
        Ok(())
    }
}

fn format_opt(opt: &Opt) -> String {
    match opt {
        Opt::Debug => "D".to_string(),
        Opt::Esmf => "E".to_string(),
        Opt::GregorianCalendar => "CG".to_string(),
        Opt::StopOption { unit, n } => format!("L{unit}{n}"),
        Opt::SinglePoint => "R".to_string(),
        Opt::AsyncIo { cpl, stride } => match stride {
            Some(s) => format!("A{cpl}x{s}"),
            None => format!("A{cpl}"),
        },
        Opt::Procs { procs, threads } => match threads {
            Some(t) => format!("P{procs}x{t}"),
            None => format!("P{procs}"),
        },
        Opt::Mpilib(m) => format!("M{m}"),
        Opt::Ninst(n) => format!("N{n}"),
        Opt::Ncpl(n) => format!("C{n}"),
        Opt::Driver(d) => format!("V{d}"),
        Opt::BuildOnly => "B".to_string(),
        Opt::I => "I".to_string(),
        Opt::Iop => "IOP".to_string(),
        Opt::GenerateBaseline => "G".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_name() {
        let id = TestId::parse("SMS.f09_g16.X").unwrap();
        assert_eq!(id.case, "SMS");
        assert!(id.opts.is_empty());
        assert_eq!(id.grid, "f09_g16");
        assert_eq!(id.compset, "X");
    }

    #[test]
    fn parses_opts_and_machine_compiler() {
        let id = TestId::parse("ERS_P16x2_D_Ln9.f09_g16.X.machine_gnu").unwrap();
        assert_eq!(id.case, "ERS");
        assert_eq!(id.procs_opt(), Some((16, Some(2))));
        assert!(id.has_opt(|o| matches!(o, Opt::Debug)));
        assert!(id.has_opt(|o| matches!(o, Opt::StopOption { unit: 'n', n: 9 })));
        assert_eq!(id.machine.as_deref(), Some("machine"));
        assert_eq!(id.compiler.as_deref(), Some("gnu"));
    }

    #[test]
    fn rejects_n_and_c_together() {
        let err = TestId::parse("ERS_N2_C4.f09_g16.X").unwrap_err();
        assert!(matches!(err, TestIdError::ConflictingInstanceCount { .. }));
    }

    #[test]
    fn rejects_n_with_nuopc() {
        let err = TestId::parse("ERS_N2_Vnuopc.f09_g16.X").unwrap_err();
        assert!(matches!(err, TestIdError::NInstWithNuopc { .. }));
    }

    #[test]
    fn force_procs_replaces_existing_p_opt() {
        let id = TestId::parse("ERS_P4.f09_g16.X").unwrap();
        let forced = id.with_forced_procs(16, None);
        assert_eq!(forced.procs_opt(), Some((16, None)));
        assert_eq!(forced.to_string(), "ERS_P16.f09_g16.X");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let original = "ERS_P16x2_D_Ln9.f09_g16.X.machine_gnu.my_mods";
        let id = TestId::parse(original).unwrap();
        assert_eq!(id.to_string(), original);
    }

    #[test]
    fn cg_is_not_confused_with_c_opt() {
        let id = TestId::parse("ERS_CG.f09_g16.X").unwrap();
        assert!(id.has_opt(|o| matches!(o, Opt::GregorianCalendar)));
        assert!(id.opts.iter().all(|o| !matches!(o, Opt::Ncpl(_))));
    }
}
