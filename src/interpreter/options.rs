//! Shell options: `set -o` flags and `shopt` flags.

/// Options controlled by `set`.
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// set -e: exit on non-zero status
    pub errexit: bool,
    /// set -u: unset variable references are errors
    pub nounset: bool,
    /// set -o pipefail: pipeline status is the rightmost failure
    pub pipefail: bool,
    /// set -C: refuse `>` onto existing files
    pub noclobber: bool,
    /// set -f: no pathname expansion
    pub noglob: bool,
    /// set -x: trace expanded commands
    pub xtrace: bool,
    /// set -v: echo input lines as read
    pub verbose: bool,
    /// set -m: job control
    pub monitor: bool,
    /// set -o posix
    pub posix: bool,
    /// set -a: export on assignment
    pub allexport: bool,
    /// set -n: parse but do not execute
    pub noexec: bool,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            errexit: false,
            nounset: false,
            pipefail: false,
            noclobber: false,
            noglob: false,
            xtrace: false,
            verbose: false,
            monitor: false,
            posix: false,
            allexport: false,
            noexec: false,
        }
    }
}

impl ShellOptions {
    /// Flags for `$-`, one letter per enabled short option.
    pub fn flag_string(&self, interactive: bool) -> String {
        let mut s = String::new();
        if self.allexport {
            s.push('a');
        }
        if self.noclobber {
            s.push('C');
        }
        if self.errexit {
            s.push('e');
        }
        if self.noglob {
            s.push('f');
        }
        if interactive {
            s.push('i');
        }
        if self.monitor {
            s.push('m');
        }
        if self.noexec {
            s.push('n');
        }
        if self.nounset {
            s.push('u');
        }
        if self.verbose {
            s.push('v');
        }
        if self.xtrace {
            s.push('x');
        }
        s
    }

    /// Map a short flag letter to its field; used by `set -e` parsing.
    pub fn set_short(&mut self, flag: char, on: bool) -> bool {
        match flag {
            'e' => self.errexit = on,
            'u' => self.nounset = on,
            'C' => self.noclobber = on,
            'f' => self.noglob = on,
            'x' => self.xtrace = on,
            'v' => self.verbose = on,
            'm' => self.monitor = on,
            'a' => self.allexport = on,
            'n' => self.noexec = on,
            _ => return false,
        }
        true
    }

    /// Map a `set -o` name to its field.
    pub fn set_named(&mut self, name: &str, on: bool) -> bool {
        match name {
            "errexit" => self.errexit = on,
            "nounset" => self.nounset = on,
            "pipefail" => self.pipefail = on,
            "noclobber" => self.noclobber = on,
            "noglob" => self.noglob = on,
            "xtrace" => self.xtrace = on,
            "verbose" => self.verbose = on,
            "monitor" => self.monitor = on,
            "posix" => self.posix = on,
            "allexport" => self.allexport = on,
            "noexec" => self.noexec = on,
            _ => return false,
        }
        true
    }

    pub const NAMED: &'static [&'static str] = &[
        "allexport",
        "errexit",
        "monitor",
        "noclobber",
        "noexec",
        "noglob",
        "nounset",
        "pipefail",
        "posix",
        "verbose",
        "xtrace",
    ];

    pub fn get_named(&self, name: &str) -> Option<bool> {
        Some(match name {
            "errexit" => self.errexit,
            "nounset" => self.nounset,
            "pipefail" => self.pipefail,
            "noclobber" => self.noclobber,
            "noglob" => self.noglob,
            "xtrace" => self.xtrace,
            "verbose" => self.verbose,
            "monitor" => self.monitor,
            "posix" => self.posix,
            "allexport" => self.allexport,
            "noexec" => self.noexec,
            _ => return None,
        })
    }
}

/// Options controlled by `shopt`.
#[derive(Debug, Clone)]
pub struct ShoptOptions {
    /// Extended glob operators `?( *( +( @( !(`
    pub extglob: bool,
    /// `*` matches dotfiles
    pub dotglob: bool,
    /// Non-matching patterns expand to nothing
    pub nullglob: bool,
    /// Non-matching patterns are an error
    pub failglob: bool,
    /// `**` matches across directories
    pub globstar: bool,
    /// Case-insensitive pathname expansion
    pub nocaseglob: bool,
    /// Case-insensitive `case` and `[[ == ]]` matching
    pub nocasematch: bool,
    /// Alias expansion (on by default in interactive shells)
    pub expand_aliases: bool,
}

impl Default for ShoptOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            dotglob: false,
            nullglob: false,
            failglob: false,
            globstar: false,
            nocaseglob: false,
            nocasematch: false,
            expand_aliases: false,
        }
    }
}

impl ShoptOptions {
    pub const NAMED: &'static [&'static str] = &[
        "dotglob",
        "expand_aliases",
        "extglob",
        "failglob",
        "globstar",
        "nocaseglob",
        "nocasematch",
        "nullglob",
    ];

    pub fn set_named(&mut self, name: &str, on: bool) -> bool {
        match name {
            "extglob" => self.extglob = on,
            "dotglob" => self.dotglob = on,
            "nullglob" => self.nullglob = on,
            "failglob" => self.failglob = on,
            "globstar" => self.globstar = on,
            "nocaseglob" => self.nocaseglob = on,
            "nocasematch" => self.nocasematch = on,
            "expand_aliases" => self.expand_aliases = on,
            _ => return false,
        }
        true
    }

    pub fn get_named(&self, name: &str) -> Option<bool> {
        Some(match name {
            "extglob" => self.extglob,
            "dotglob" => self.dotglob,
            "nullglob" => self.nullglob,
            "failglob" => self.failglob,
            "globstar" => self.globstar,
            "nocaseglob" => self.nocaseglob,
            "nocasematch" => self.nocasematch,
            "expand_aliases" => self.expand_aliases,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_string_orders_flags() {
        let mut opts = ShellOptions::default();
        opts.errexit = true;
        opts.xtrace = true;
        assert_eq!(opts.flag_string(false), "ex");
        assert_eq!(opts.flag_string(true), "eix");
    }

    #[test]
    fn named_round_trip() {
        let mut opts = ShellOptions::default();
        assert!(opts.set_named("pipefail", true));
        assert_eq!(opts.get_named("pipefail"), Some(true));
        assert!(!opts.set_named("bogus", true));
    }

    #[test]
    fn shopt_round_trip() {
        let mut opts = ShoptOptions::default();
        assert!(opts.set_named("extglob", true));
        assert_eq!(opts.get_named("extglob"), Some(true));
    }
}
