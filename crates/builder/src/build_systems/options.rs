//! Option discovery from build tool help output

use super::ConfigOption;
use crate::utils::text::truncate_chars;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_DESCRIPTION_CHARS: usize = 200;

/// `CMake` variables worth exposing despite the `CMAKE_` prefix
const EXPOSED_CMAKE_VARIABLES: [&str; 2] = ["CMAKE_BUILD_TYPE", "CMAKE_INSTALL_PREFIX"];

/// Parse `./configure --help` into enable, disable and with switches
///
/// Options are deduplicated by feature name, first occurrence wins.
pub(crate) fn parse_autotools_options(help: &str) -> Vec<ConfigOption> {
    let entries = help_entries(help);
    let mut seen = HashSet::new();
    let mut options = Vec::new();
    for (kind, is_feature, default_enabled) in [
        ("enable", true, false),
        ("disable", true, true),
        ("with", false, false),
    ] {
        for entry in entries.iter().filter(|e| e.kind == kind) {
            if !seen.insert(entry.feature.to_ascii_lowercase()) {
                continue;
            }
            let description = entry.description.join(" ");
            let description = description.split_whitespace().collect::<Vec<_>>().join(" ");
            options.push(ConfigOption {
                name: format!("--{kind}-{}", entry.feature),
                description: truncate_chars(&description, MAX_DESCRIPTION_CHARS).to_string(),
                is_feature,
                default_enabled,
                value: None,
                selected: false,
            });
        }
    }
    options
}

/// One option block of configure help, in document order
#[derive(Debug)]
struct HelpEntry<'a> {
    kind: &'a str,
    feature: &'a str,
    description: Vec<&'a str>,
}

/// A line opening an option: `--enable-foo[=ARG]  text`
fn option_line_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\s*--(enable|disable|with)-([A-Za-z0-9_+.-]+)(?:\[?=\S*)?(?:\s+(.*))?$")
                .ok()
        })
        .as_ref()
}

/// An indented line continuing the previous option's description
fn continuation_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s+([^\s-].*)$").ok())
        .as_ref()
}

fn help_entries(help: &str) -> Vec<HelpEntry<'_>> {
    let (Some(head), Some(continuation)) = (option_line_regex(), continuation_regex()) else {
        return Vec::new();
    };

    let mut entries: Vec<HelpEntry<'_>> = Vec::new();
    let mut open = false;
    for line in help.lines() {
        if let Some(caps) = head.captures(line) {
            let (Some(kind), Some(feature)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let feature = feature.as_str();
            // Generic `--enable-FEATURE[=ARG]` usage lines
            if feature.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                open = false;
                continue;
            }
            entries.push(HelpEntry {
                kind: kind.as_str(),
                feature,
                description: caps
                    .get(3)
                    .map(|m| m.as_str().trim())
                    .filter(|text| !text.is_empty())
                    .into_iter()
                    .collect(),
            });
            open = true;
        } else if let Some(text) = continuation
            .captures(line)
            .and_then(|caps| caps.get(1))
            .filter(|_| open)
        {
            if let Some(entry) = entries.last_mut() {
                entry.description.push(text.as_str().trim_end());
            }
        } else {
            open = false;
        }
    }
    entries
}

fn cache_line_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\w+):(\w+)=(.*)$").ok())
        .as_ref()
}

/// Parse `cmake -L` output lines of the form `NAME:TYPE=VALUE`
pub(crate) fn parse_cmake_cache(listing: &str) -> Vec<ConfigOption> {
    let Some(re) = cache_line_regex() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    listing
        .lines()
        .filter_map(|line| re.captures(line.trim()))
        .filter_map(|caps| {
            let name = caps[1].to_string();
            let kind = caps[2].to_ascii_uppercase();
            let value = caps[3].trim().to_string();

            if name.starts_with("CMAKE_") && !EXPOSED_CMAKE_VARIABLES.contains(&name.as_str()) {
                return None;
            }
            if kind == "INTERNAL" || kind == "STATIC" || !seen.insert(name.clone()) {
                return None;
            }

            let default_enabled = is_truthy(&value);
            let is_feature = kind == "BOOL" || default_enabled || is_falsy(&value);
            let description = format!("Type: {kind}, Default: {value}");
            Some(ConfigOption {
                name: format!("-D{name}"),
                description,
                is_feature,
                default_enabled,
                value: (!value.is_empty()).then_some(value),
                selected: false,
            })
        })
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "on" | "true" | "1" | "yes")
}

fn is_falsy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "off" | "false" | "0" | "no")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIGURE_HELP: &str = "\
Optional Features:
  --disable-option-checking  ignore unrecognized --enable/--with options
  --enable-FEATURE[=ARG]  include FEATURE [ARG=yes]
  --enable-silent-rules   less verbose build output (undo: \"make V=1\")
  --disable-nls           do not use Native Language Support
  --enable-debug          build with debugging symbols
                          and assertions enabled
  --enable-debug          duplicate entry

Optional Packages:
  --with-PACKAGE[=ARG]    use PACKAGE [ARG=yes]
  --with-libpng=DIR       use libpng installed in DIR
";

    #[test]
    fn test_autotools_options_are_parsed_and_deduplicated() {
        let options = parse_autotools_options(CONFIGURE_HELP);
        let names: Vec<_> = options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "--enable-silent-rules",
                "--enable-debug",
                "--disable-option-checking",
                "--disable-nls",
                "--with-libpng"
            ]
        );

        let debug = &options[1];
        assert_eq!(
            debug.description,
            "build with debugging symbols and assertions enabled"
        );
        assert!(debug.is_feature);
        assert!(!debug.default_enabled);

        let nls = options.iter().find(|o| o.name == "--disable-nls").unwrap();
        assert!(nls.default_enabled);

        let png = options.iter().find(|o| o.name == "--with-libpng").unwrap();
        assert!(!png.is_feature);
        assert_eq!(png.description, "use libpng installed in DIR");
    }

    #[test]
    fn test_autotools_descriptions_stop_at_block_boundaries() {
        let help = "\
  --enable-nls            enable native language support
                          for messages

  --with-zlib=DIR         use zlib in DIR
Some other section:
  not part of the zlib option
  --enable-threads
                          use POSIX threads
  --prefix=PREFIX         install files in PREFIX
";
        let options = parse_autotools_options(help);
        let summary: Vec<_> = options
            .iter()
            .map(|o| (o.name.as_str(), o.description.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("--enable-nls", "enable native language support for messages"),
                ("--enable-threads", "use POSIX threads"),
                ("--with-zlib", "use zlib in DIR"),
            ]
        );
    }

    #[test]
    fn test_descriptions_are_bounded() {
        let long = format!("  --enable-big   {}\n", "x".repeat(500));
        let options = parse_autotools_options(&long);
        assert_eq!(options[0].description.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_cmake_cache_listing() {
        let listing = "\
-- Cache values
BUILD_SHARED_LIBS:BOOL=ON
CMAKE_BUILD_TYPE:STRING=Release
CMAKE_C_COMPILER:FILEPATH=/usr/bin/cc
WITH_DOCS:BOOL=OFF
INSTALL_DATADIR:PATH=share
";
        let options = parse_cmake_cache(listing);
        let names: Vec<_> = options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "-DBUILD_SHARED_LIBS",
                "-DCMAKE_BUILD_TYPE",
                "-DWITH_DOCS",
                "-DINSTALL_DATADIR"
            ]
        );
        assert!(options[0].default_enabled);
        assert_eq!(options[0].description, "Type: BOOL, Default: ON");
        assert!(!options[2].default_enabled);
        assert!(options[2].is_feature);
        assert!(!options[3].is_feature);
        assert_eq!(options[3].value.as_deref(), Some("share"));
        assert_eq!(options[3].to_arg(), "-DINSTALL_DATADIR=share");
        assert_eq!(options[1].to_arg(), "-DCMAKE_BUILD_TYPE=Release");
    }
}
