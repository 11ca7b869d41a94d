//! Install phases and the CLI stage selector.

use std::fmt;

/// A unit of install work with its own environment document.
///
/// Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Packages built with the base compiler; also provides the registry the
    /// other phases include.
    BasePackages,
    /// The module system itself.
    Lmod,
    /// Compiler toolchains built with the base compiler.
    Compilers,
    /// Utilities built with the utility compiler.
    Utilities,
    /// Third-party libraries across compilers, MPIs and CUDAs.
    Tpls,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::BasePackages,
        Phase::Lmod,
        Phase::Compilers,
        Phase::Utilities,
        Phase::Tpls,
    ];

    /// Generated document name inside the project directory.
    pub fn document_name(self) -> &'static str {
        match self {
            Phase::BasePackages => "base-packages-spack.yaml",
            Phase::Lmod => "lmod-spack.yaml",
            Phase::Compilers => "compilers-spack.yaml",
            Phase::Utilities => "utilities-spack.yaml",
            Phase::Tpls => "tpl-spack.yaml",
        }
    }

    pub fn default_attempts(self) -> u32 {
        match self {
            Phase::Tpls => 3,
            _ => 2,
        }
    }

    /// Whether a successful install is followed by `module lmod refresh`.
    pub fn generates_modules(self) -> bool {
        matches!(self, Phase::Compilers | Phase::Utilities | Phase::Tpls)
    }

    pub fn stage(self) -> Stage {
        match self {
            Phase::BasePackages | Phase::Lmod => Stage::Base,
            Phase::Compilers => Stage::Compiler,
            Phase::Utilities => Stage::Utility,
            Phase::Tpls => Stage::Tpl,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::BasePackages => "base-packages",
            Phase::Lmod => "lmod",
            Phase::Compilers => "compilers",
            Phase::Utilities => "utilities",
            Phase::Tpls => "tpl",
        };
        f.write_str(name)
    }
}

/// Stage selector from `install --stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Stage {
    #[default]
    All,
    Base,
    Compiler,
    Utility,
    Tpl,
}

impl Stage {
    pub fn includes(self, phase: Phase) -> bool {
        self == Stage::All || phase.stage() == self
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::All => "all",
            Stage::Base => "base",
            Stage::Compiler => "compiler",
            Stage::Utility => "utility",
            Stage::Tpl => "tpl",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_stage_covers_lmod() {
        assert!(Stage::Base.includes(Phase::BasePackages));
        assert!(Stage::Base.includes(Phase::Lmod));
        assert!(!Stage::Base.includes(Phase::Compilers));
        assert!(Phase::ALL.iter().all(|p| Stage::All.includes(*p)));
    }

    #[test]
    fn only_later_phases_generate_modules() {
        let with_modules: Vec<_> = Phase::ALL
            .iter()
            .copied()
            .filter(|p| p.generates_modules())
            .collect();
        assert_eq!(
            with_modules,
            vec![Phase::Compilers, Phase::Utilities, Phase::Tpls]
        );
    }
}
