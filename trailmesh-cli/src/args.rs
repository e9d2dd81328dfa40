//! Simple command-line argument parser.
//!
//! No external dependencies. Supports `--flag`, `--key value`, `--key=value`,
//! and `-v` (count).

use std::collections::HashMap;

/// Parsed command-line arguments.
pub struct Args {
    pub flags: HashMap<String, String>,
    pub positional: Vec<String>,
    pub verbosity: u8,
}

impl Args {
    /// Parse command-line arguments (skipping argv[0]).
    pub fn parse() -> Self {
        Self::parse_from(std::env::args().skip(1).collect())
    }

    /// Parse from a list of argument strings.
    pub fn parse_from(args: Vec<String>) -> Self {
        let mut flags = HashMap::new();
        let mut positional = Vec::new();
        let mut verbosity: u8 = 0;
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            if let Some(key) = arg.strip_prefix("--") {
                // Check for --key=value syntax
                if let Some((k, v)) = key.split_once('=') {
                    flags.insert(k.to_string(), v.to_string());
                    continue;
                }
                match key {
                    // Boolean flags that don't take values
                    "version" | "help" => {
                        flags.insert(key.to_string(), "true".into());
                    }
                    _ => {
                        // Next arg is the value
                        if let Some(val) = iter.next() {
                            flags.insert(key.to_string(), val);
                        } else {
                            flags.insert(key.to_string(), "true".into());
                        }
                    }
                }
            } else if arg.starts_with('-') && arg.len() > 1 {
                for c in arg[1..].chars() {
                    match c {
                        'v' => verbosity = verbosity.saturating_add(1),
                        'h' => {
                            flags.insert("help".into(), "true".into());
                        }
                        _ => {
                            flags.insert(c.to_string(), "true".into());
                        }
                    }
                }
            } else {
                positional.push(arg);
            }
        }

        Args {
            flags,
            positional,
            verbosity,
        }
    }

    /// Get a flag value by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(|s| s.as_str())
    }

    /// Check if a flag is set.
    pub fn has(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    /// Get a numeric flag with a fallback.
    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
