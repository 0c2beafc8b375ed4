//! Shell allow-list and selection order.

use std::fmt;
use std::str::FromStr;

/// Shells a terminal may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shell {
    Bash,
    Sh,
    Powershell,
    Cmd,
}

/// A shell name outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownShell(pub String);

impl Shell {
    /// Every allowed shell, in fallback order.
    pub const ALL: [Shell; 4] = [Shell::Bash, Shell::Sh, Shell::Powershell, Shell::Cmd];

    /// The executable name passed to the container.
    pub fn as_str(self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Sh => "sh",
            Shell::Powershell => "powershell",
            Shell::Cmd => "cmd",
        }
    }

    /// The exec command line for this shell.
    pub fn command(self) -> Vec<String> {
        vec![self.as_str().to_string()]
    }

    /// Shells to try for a start request.
    ///
    /// An allowed hint is used on its own. A missing or unknown hint yields
    /// the whole allow-list in fallback order.
    pub fn candidates(hint: Option<&str>) -> Vec<Shell> {
        match hint.map(str::parse::<Shell>) {
            Some(Ok(shell)) => vec![shell],
            _ => Shell::ALL.to_vec(),
        }
    }
}

impl FromStr for Shell {
    type Err = UnknownShell;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shell::ALL
            .into_iter()
            .find(|shell| shell.as_str() == s)
            .ok_or_else(|| UnknownShell(s.to_string()))
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
