use log::{info, warn};
use serde::Serialize;

use crate::error::Result;
use crate::toolchain::{find_toolchain, Toolchain, COMPILER_CANDIDATES};

/// Named build profile controlling compiler choice, sanitizer
/// instrumentation, and post-build action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVariant {
    Debug,
    Release,
    Asan,
    Tsan,
    LeakCheck,
    Coverage,
    Lint,
    Client,
}

impl BuildVariant {
    /// Parse a tag case-insensitively. Unknown tags fall back to Debug;
    /// this is a deliberate degrade-gracefully policy, not an error path.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "RELEASE" => Self::Release,
            "ASAN" => Self::Asan,
            "TSAN" => Self::Tsan,
            "LEAKCHECK" | "LEAK_CHECK" => Self::LeakCheck,
            "COVERAGE" => Self::Coverage,
            "LINT" => Self::Lint,
            "CLIENT" => Self::Client,
            other => {
                warn!("Unknown build variant '{other}', falling back to DEBUG");
                Self::Debug
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostAction {
    None,
    GenerateCoverage,
    LintOnly,
}

/// Concrete toolchain configuration a variant tag resolves to.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub variant: BuildVariant,
    pub build_subtype: &'static str,
    pub override_compiler: bool,
    /// Extra test-filter expression passed to the test tool, e.g. a label
    /// exclusion for tests that cannot run under TSAN.
    pub extra_filter: Option<String>,
    pub post_action: PostAction,
    /// Every raw log must show the instrumentation-active marker.
    pub leak_check_required: bool,
    pub toolchain: Option<Toolchain>,
}

/// Map a requested variant tag to its build configuration.
///
/// The mapping itself is a static table and never fails; the only fatal
/// path is a compiler override with no discoverable candidate, which
/// aborts the run before anything is built.
pub fn resolve(tag: &str) -> Result<BuildConfig> {
    let variant = BuildVariant::parse(tag);

    let mut config = match variant {
        BuildVariant::Debug => BuildConfig {
            variant,
            build_subtype: "debug",
            override_compiler: false,
            extra_filter: None,
            post_action: PostAction::None,
            leak_check_required: false,
            toolchain: None,
        },
        BuildVariant::Release => BuildConfig {
            variant,
            build_subtype: "release",
            override_compiler: false,
            extra_filter: None,
            post_action: PostAction::None,
            leak_check_required: false,
            toolchain: None,
        },
        BuildVariant::Asan => BuildConfig {
            variant,
            build_subtype: "fastdebug",
            override_compiler: true,
            extra_filter: None,
            post_action: PostAction::None,
            leak_check_required: false,
            toolchain: None,
        },
        BuildVariant::Tsan => BuildConfig {
            variant,
            build_subtype: "fastdebug",
            override_compiler: true,
            extra_filter: Some("-LE no_tsan".to_string()),
            post_action: PostAction::None,
            leak_check_required: false,
            toolchain: None,
        },
        BuildVariant::LeakCheck => BuildConfig {
            variant,
            build_subtype: "debug",
            override_compiler: false,
            extra_filter: None,
            post_action: PostAction::None,
            leak_check_required: true,
            toolchain: None,
        },
        BuildVariant::Coverage => BuildConfig {
            variant,
            build_subtype: "debug",
            override_compiler: false,
            extra_filter: None,
            post_action: PostAction::GenerateCoverage,
            leak_check_required: false,
            toolchain: None,
        },
        BuildVariant::Lint => BuildConfig {
            variant,
            build_subtype: "debug",
            override_compiler: false,
            extra_filter: None,
            post_action: PostAction::LintOnly,
            leak_check_required: false,
            toolchain: None,
        },
        BuildVariant::Client => BuildConfig {
            variant,
            build_subtype: "debug",
            override_compiler: true,
            extra_filter: None,
            post_action: PostAction::None,
            leak_check_required: false,
            toolchain: None,
        },
    };

    if config.override_compiler {
        config.toolchain = Some(find_toolchain(COMPILER_CANDIDATES)?);
    }

    info!(
        "Resolved variant {:?} (subtype: {})",
        config.variant, config.build_subtype
    );

    Ok(config)
}
