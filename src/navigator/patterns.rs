/// Glob-like description of what a group of files share, if anything.
///
/// Combines the longest common directory prefix with a shared extension:
/// `src/auth/**/*.rs`, `src/auth/**`, `**/*.md`, or `None`.
pub fn path_pattern<S: AsRef<str>>(files: &[S]) -> Option<String> {
    let first = files.first()?.as_ref();

    let mut prefix: Vec<&str> = parent_components(first);
    for file in &files[1..] {
        let dirs = parent_components(file.as_ref());
        let shared = prefix
            .iter()
            .zip(&dirs)
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(shared);
        if prefix.is_empty() {
            break;
        }
    }

    let ext = extension(first)
        .filter(|ext| files.iter().all(|f| extension(f.as_ref()) == Some(*ext)));

    match (prefix.is_empty(), ext) {
        (false, Some(ext)) => Some(format!("{}/**/*.{ext}", prefix.join("/"))),
        (false, None) => Some(format!("{}/**", prefix.join("/"))),
        (true, Some(ext)) => Some(format!("**/*.{ext}")),
        (true, None) => None,
    }
}

fn parent_components(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    parts.pop();
    parts
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&["src/auth/jwt.rs", "src/auth/session.rs"], Some("src/auth/**/*.rs"); "dir and ext")]
    #[test_case(&["src/auth/jwt.rs", "src/auth/mod.ts"], Some("src/auth/**"); "dir only")]
    #[test_case(&["README.md", "docs/guide.md"], Some("**/*.md"); "ext only")]
    #[test_case(&["a.rs", "b/c.py"], None; "nothing shared")]
    #[test_case(&["src/a/x.rs", "src/b/y.rs"], Some("src/**/*.rs"); "partial prefix")]
    #[test_case(&[".env", "config/.env"], None; "dotfiles have no extension")]
    fn patterns(files: &[&str], expected: Option<&str>) {
        assert_eq!(path_pattern(files).as_deref(), expected);
    }

    #[test]
    fn empty_group_has_no_pattern() {
        let files: [&str; 0] = [];
        assert_eq!(path_pattern(&files), None);
    }
}
