// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The AppRun/AppImage environment scrub described in the resource manager's external
//! interfaces: when this process is itself running inside an AppImage bundle, every child
//! process it spawns should behave as though launched outside of one.
//!
//! The mutation is expressed as a pure function over a plain environment map so it can be
//! tested without touching the real process environment; [`init`] is the single guarded entry
//! point that applies it to `std::env` once, from `main`, per the design notes' explicit
//! preference for an `Init()` call over a language-level global constructor.

use std::collections::HashMap;
use std::sync::Once;

const STRIPPED_EXACT: [&str; 2] = ["ARGV0", "ORIGIN"];
const STRIPPED_PREFIXES: [&str; 4] = ["APPRUN_", "APPDIR", "APPIMAGE", "AIX_"];
const ORIGINAL_PREFIX: &str = "APPRUN_ORIGINAL_";
const CWD_VAR: &str = "APPRUN_CWD";
const MOUNT_PREFIX: &str = "/tmp/.mount_";

fn should_strip(key: &str) -> bool {
    STRIPPED_EXACT.contains(&key) || STRIPPED_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Scrubs an AppImage-launched environment map in place, returning the working directory it
/// should be restored to, if any. A no-op (returns `None`, leaves `env` untouched) unless
/// `APPIMAGE` is present.
pub fn scrub(env: &mut HashMap<String, String>) -> Option<String> {
    if !env.contains_key("APPIMAGE") {
        return None;
    }

    // Capture what needs to survive the strip before removing anything: the restored CWD and
    // the `APPRUN_ORIGINAL_<name>` overrides are themselves under prefixes we are about to wipe.
    let cwd = env.get(CWD_VAR).cloned();
    let originals: Vec<(String, String)> = env
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(ORIGINAL_PREFIX).map(|name| (name.to_owned(), v.clone())))
        .collect();

    let to_strip: Vec<String> = env.keys().filter(|k| should_strip(k)).cloned().collect();
    for key in to_strip {
        env.remove(&key);
    }

    for (name, original_value) in originals {
        env.insert(name, original_value);
    }

    for value in env.values_mut() {
        if value.contains(':') {
            *value = value
                .split(':')
                .filter(|segment| !segment.starts_with(MOUNT_PREFIX))
                .collect::<Vec<_>>()
                .join(":");
        }
    }

    cwd
}

static INIT: Once = Once::new();

/// Applies [`scrub`] to the real process environment and current working directory, exactly
/// once per process. Safe to call unconditionally from every entry point; only the first call
/// has any effect.
pub fn init() {
    INIT.call_once(|| {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        let Some(cwd) = scrub(&mut env) else { return };

        for (key, _) in std::env::vars() {
            if should_strip(&key) {
                std::env::remove_var(&key);
            }
        }
        for (key, value) in &env {
            std::env::set_var(key, value);
        }
        if let Err(e) = std::env::set_current_dir(&cwd) {
            log::warn!("failed to restore AppImage working directory `{cwd}`: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn non_appimage_environment_is_untouched() {
        let mut e = env(&[("PATH", "/usr/bin")]);
        let original = e.clone();
        assert_eq!(scrub(&mut e), None);
        assert_eq!(e, original);
    }

    #[test]
    fn full_scrub_scenario() {
        let mut e = env(&[
            ("APPIMAGE", "/path/to/bundle.AppImage"),
            ("APPRUN_ORIGINAL_PATH", "/usr/bin"),
            ("PATH", "/tmp/.mount_x/bin:/usr/bin"),
            ("APPRUN_CWD", "/home/user/project"),
            ("APPDIR", "/tmp/.mount_x"),
            ("ARGV0", "my-app"),
            ("ORIGIN", "/tmp/.mount_x"),
            ("AIX_SOMETHING", "1"),
            ("UNRELATED", "kept"),
        ]);

        let cwd = scrub(&mut e);
        assert_eq!(cwd.as_deref(), Some("/home/user/project"));
        assert_eq!(e.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert!(!e.contains_key("APPIMAGE"));
        assert!(!e.contains_key("APPDIR"));
        assert!(!e.contains_key("ARGV0"));
        assert!(!e.contains_key("ORIGIN"));
        assert!(!e.contains_key("AIX_SOMETHING"));
        assert!(!e.contains_key("APPRUN_CWD"));
        assert!(!e.contains_key("APPRUN_ORIGINAL_PATH"));
        assert_eq!(e.get("UNRELATED").map(String::as_str), Some("kept"));
    }

    #[test]
    fn mount_paths_are_filtered_even_without_an_override() {
        let mut e = env(&[
            ("APPIMAGE", "1"),
            ("LD_LIBRARY_PATH", "/tmp/.mount_x/lib:/usr/lib:/tmp/.mount_x/lib2"),
        ]);
        scrub(&mut e);
        assert_eq!(e.get("LD_LIBRARY_PATH").map(String::as_str), Some("/usr/lib"));
    }
}
