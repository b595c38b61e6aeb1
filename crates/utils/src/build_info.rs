/// Git metadata captured by `build.rs`. Fields are empty when the crate is
/// built outside a git checkout.
pub(crate) struct BuildInfo {
    pub commit_sha1: Option<&'static str>,
    pub git_dirty: bool,
}

const fn is_true(value: Option<&str>) -> bool {
    match value {
        Some(s) => {
            let b = s.as_bytes();
            b.len() == 4 && b[0] == b't' && b[1] == b'r' && b[2] == b'u' && b[3] == b'e'
        }
        None => false,
    }
}

pub(crate) const BUILD_INFO: BuildInfo = BuildInfo {
    commit_sha1: option_env!("VERGEN_GIT_SHA"),
    git_dirty: is_true(option_env!("VERGEN_GIT_DIRTY")),
};
