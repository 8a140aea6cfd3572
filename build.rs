use std::process::Command;

/// Sets `GIT_VERSION` to the package version with the commit as build
/// metadata, e.g. `0.1.0+g1a2b3c4` or `0.1.0+g1a2b3c4.dirty`.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let package = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let version = match commit() {
        Some(commit) => format!("{package}+g{commit}"),
        None => package,
    };
    println!("cargo:rustc-env=GIT_VERSION={version}");
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8(output.stdout).ok()?.trim().to_string())
}

fn commit() -> Option<String> {
    let hash = git(&["rev-parse", "--short", "HEAD"]).filter(|h| !h.is_empty())?;
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).is_some_and(|s| !s.is_empty());
    Some(if dirty { format!("{hash}.dirty") } else { hash })
}
