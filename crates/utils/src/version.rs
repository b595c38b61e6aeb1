use std::sync::LazyLock;

use crate::build_info::BUILD_INFO;

/// Image version plus the commit the binary was built from.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}-{}{}",
        env!("IMAGE_VERSION"),
        BUILD_INFO.commit_sha1.unwrap_or("unknown"),
        if BUILD_INFO.git_dirty { "-dirty" } else { "" }
    )
});

/// `User-Agent` value for outgoing HTTP requests made by `component`.
pub fn user_agent(component: &str) -> String {
    format!("{component}/{}", &*VERSION)
}
