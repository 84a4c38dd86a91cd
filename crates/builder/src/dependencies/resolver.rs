//! Missing-dependency extraction from free-form tool output

use super::catalog::{map_dependency_to_package, unpackaged};
use super::DependencyInfo;
use crate::utils::patterns::{compile, compile_all};
use crate::utils::text::truncate_chars;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Lines that never describe a missing dependency
const SKIP_PATTERNS: &[&str] = &[
    r"^Command not found",
    r"^The required build tool",
    r"^Install with:",
    r"^Error running command",
    r"git commit",
    r"git command",
    r"git describe",
    r"gather commit ID",
    r"versioning",
    r"Call Stack",
    r"cmake_minimum_required",
    r"Compatibility with CMake",
    r"Update the VERSION",
];

/// Extraction patterns; capture group 1 is the dependency name
///
/// The flag marks patterns whose match is discarded when preceded by
/// `command `, so `Command could not find` is not read as a dependency.
const EXTRACTION_PATTERNS: &[(&str, bool)] = &[
    (r"checking for (\S+)\.\.\. no", false),
    (r"Package '([^']+)' not found", false),
    (r"No package '([^']+)' found", false),
    (r"could not find (\S+)", true),
    (r"Could not find required program (\S+)", false),
    (r"Could not find program (\S+)", false),
    (r"(?:library |lib)(\S+) not found", false),
    (r"missing:\s*(\S+)", false),
    (r"requires\s+(\S+)", false),
    (r"Package\s+'([^']+)'\s+not found", false),
    (r"Could NOT find (\w+)", false),
    (r#"package configuration file provided by\s+"([^"]+)""#, false),
    (r#"not providing\s+"Find([^"]+)\.cmake""#, false),
    (r"^\s+-\s+(\S+)\s*$", false),
    (
        r"fatal error:\s+([A-Za-z0-9_\-/\.]+)\s*:\s*No such file or directory",
        false,
    ),
    (r"\b([A-Za-z0-9_\-]+)\s+header\s+not\s+found\b", false),
    (
        r"\b([A-Za-z0-9_\-]+)\s+(?:header\s+)?not\s+found\s+on\s+system",
        false,
    ),
    (r"please\s+install\s+([A-Za-z0-9_\-]+)", false),
    (r"Found\s+([A-Za-z0-9_\-]+):\s+\S*-NOTFOUND", false),
    (r"Found\s+([A-Za-z0-9_\-]+):\s+[A-Za-z0-9_\-]+-NOTFOUND", false),
];

/// Common words the patterns above capture by accident
const FALSE_POSITIVES: &[&str] = &[
    "yes", "no", "found", "the", "a", "an", "is", "are", "was", "were", "not", "command",
    "error", "warning", "file", "directory", "to", "for", "in", "on", "at", "by", "or", "and",
    "if", "it", "be", "this", "that", "with", "from", "but", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "can", "git", "cache", "commit", "version", "id",
    "via", "cmake", "make", "required", "packages", "following", "stack", "call", "program",
    "system",
];

const FORBIDDEN_CHARS: [char; 7] = ['(', ')', '[', ']', '{', '}', '/'];

struct CompiledPatterns {
    skip: Vec<Regex>,
    extract: Vec<(Regex, bool)>,
}

fn patterns() -> &'static CompiledPatterns {
    static PATTERNS: OnceLock<CompiledPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CompiledPatterns {
        skip: compile_all(SKIP_PATTERNS),
        extract: EXTRACTION_PATTERNS
            .iter()
            .filter_map(|(pattern, reject_after_command)| {
                compile(pattern).map(|re| (re, *reject_after_command))
            })
            .collect(),
    })
}

/// Turns build output into a deduplicated dependency list
///
/// Parsing is a pure function of the input text: the same text always
/// yields the same list in the same order.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    ignored: HashSet<String>,
}

impl DependencyResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Additional names to treat as false positives
    #[must_use]
    pub fn with_ignored_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored
            .extend(names.into_iter().map(|n| n.as_ref().to_lowercase()));
        self
    }

    /// Extract missing dependencies from configure or compiler output
    #[must_use]
    pub fn parse(&self, output: &str) -> Vec<DependencyInfo> {
        let compiled = patterns();
        let mut seen = HashSet::new();
        let mut dependencies = Vec::new();

        for line in output.split('\n') {
            if compiled.skip.iter().any(|re| re.is_match(line)) {
                continue;
            }

            for (re, reject_after_command) in &compiled.extract {
                for caps in re.captures_iter(line) {
                    let (Some(whole), Some(group)) = (caps.get(0), caps.get(1)) else {
                        continue;
                    };
                    if *reject_after_command
                        && line[..whole.start()].to_lowercase().ends_with("command ")
                    {
                        continue;
                    }
                    let Some(name) = self.clean_name(group.as_str()) else {
                        continue;
                    };

                    let info = Self::dependency_info(&name, line);
                    if seen.insert(info.key()) {
                        dependencies.push(info);
                    }
                }
            }
        }

        dependencies
    }

    /// Normalize a captured token, or reject it as noise
    fn clean_name(&self, raw: &str) -> Option<String> {
        let mut name = raw.trim();
        // `argagg/argagg.hpp` -> `argagg`, `zlib.h` -> `zlib`
        if name.ends_with(".h") || name.ends_with(".hpp") {
            name = match name.split_once('/') {
                Some((first, _)) => first,
                None => name.trim_end_matches(".hpp").trim_end_matches(".h"),
            };
        }
        let name = name.trim_matches(['\'', '"', '.', ',', ';', ':']);

        let lower = name.to_lowercase();
        if FALSE_POSITIVES.contains(&lower.as_str()) || self.ignored.contains(&lower) {
            return None;
        }
        if name.chars().count() < 2 || name.contains(FORBIDDEN_CHARS) {
            return None;
        }
        if looks_like_cmake_variable(name) {
            return None;
        }
        Some(name.to_string())
    }

    /// Build the full record for one dependency name
    ///
    /// `context` is the output line the name was found on.
    #[must_use]
    pub fn dependency_info(name: &str, context: &str) -> DependencyInfo {
        let clean = name.trim().trim_matches(['\'', '"']);

        if let Some(lib) = unpackaged(clean) {
            return DependencyInfo {
                name: clean.to_string(),
                package: lib.package.map(str::to_string),
                description: lib.description.to_string(),
                is_header_only: lib.header_only,
                manual_install_url: Some(lib.url.to_string()),
                manual_install_cmd: lib.install_instructions.map(str::to_string),
                quick_install: lib.quick_install.iter().map(|s| (*s).to_string()).collect(),
                copr_repo: lib.copr_repo.map(str::to_string),
                not_in_repos: lib.package.is_none(),
                selected_for_install: true,
            };
        }

        let context = context.trim();
        let description = if context.is_empty() {
            "Required by configure".to_string()
        } else {
            truncate_chars(context, 100).to_string()
        };

        DependencyInfo {
            name: clean.to_string(),
            package: map_dependency_to_package(clean),
            description,
            is_header_only: false,
            manual_install_url: None,
            manual_install_cmd: None,
            quick_install: Vec::new(),
            copr_repo: None,
            not_in_repos: false,
            selected_for_install: true,
        }
    }
}

/// `FOO_LIBRARY`, `FOO_INCLUDE_DIR`, `FOO_ROOT` and other all-caps cache names
fn looks_like_cmake_variable(name: &str) -> bool {
    name.ends_with("_LIBRARY")
        || name.contains("_INCLUDE")
        || name.ends_with("_DIR")
        || name.ends_with("_PATH")
        || name.ends_with("_ROOT")
        || name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packages(output: &str) -> Vec<Option<String>> {
        DependencyResolver::new()
            .parse(output)
            .into_iter()
            .map(|d| d.package)
            .collect()
    }

    #[test]
    fn test_pkg_config_and_autoconf_idioms() {
        assert_eq!(
            packages("Package 'zlib' not found"),
            vec![Some("zlib-devel".to_string())]
        );
        assert_eq!(
            packages("checking for gtk... no"),
            vec![Some("gtk3-devel".to_string())]
        );
        assert_eq!(
            packages("No package 'libxml-2.0' found"),
            vec![Some("libxml2-devel".to_string())]
        );
    }

    #[test]
    fn test_cmake_idioms() {
        let output = "\
CMake Error at CMakeLists.txt:12 (find_package):
  By not providing \"FindSDL2.cmake\" in CMAKE_MODULE_PATH this project has
  asked CMake to find a package configuration file provided by \"SDL2\", but
  CMake did not find one.
-- Could NOT find PNG (missing: PNG_LIBRARY PNG_PNG_INCLUDE_DIR)
";
        let deps = DependencyResolver::new().parse(output);
        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["SDL2"]);
        // PNG is all caps, indistinguishable from a cache variable
        assert_eq!(deps[0].package.as_deref(), Some("SDL2-devel"));
    }

    #[test]
    fn test_header_paths_are_normalized() {
        let deps = DependencyResolver::new()
            .parse("main.cpp:3:10: fatal error: argagg/argagg.hpp: No such file or directory");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "argagg");
        assert!(deps[0].is_header_only);
        assert!(deps[0].not_in_repos);
        assert!(!deps[0].quick_install.is_empty());

        let deps =
            DependencyResolver::new().parse("foo.c:1:10: fatal error: zlib.h: No such file or directory");
        assert_eq!(deps[0].package.as_deref(), Some("zlib-devel"));
    }

    #[test]
    fn test_noise_is_skipped() {
        let output = "\
Command not found: cmake
Install with: sudo dnf install cmake
CMake Error: could not find git commit cache
checking for gcc... yes
  - threads
";
        let deps = DependencyResolver::new().parse(output);
        // `threads` maps to no package but is still reported
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "threads");
        assert_eq!(deps[0].package, None);
    }

    #[test]
    fn test_cmake_variable_shapes_rejected() {
        assert!(looks_like_cmake_variable("LIBSSH2A_LIBRARY"));
        assert!(looks_like_cmake_variable("FOO_INCLUDE_DIR"));
        assert!(looks_like_cmake_variable("BOOST_ROOT"));
        assert!(looks_like_cmake_variable("OPENSSL"));
        assert!(!looks_like_cmake_variable("OpenSSL"));
    }

    #[test]
    fn test_duplicates_collapse_on_package() {
        let output = "checking for zlib... no\nPackage 'zlib' not found\nlibrary z not found\n";
        let deps = DependencyResolver::new().parse(output);
        let keys: Vec<_> = deps.iter().map(DependencyInfo::key).collect();
        assert_eq!(keys.iter().filter(|k| *k == "zlib-devel").count(), 1);
    }

    #[test]
    fn test_extra_ignored_names() {
        let resolver = DependencyResolver::new().with_ignored_names(["glib"]);
        assert!(resolver.parse("checking for glib... no").is_empty());
    }
}
