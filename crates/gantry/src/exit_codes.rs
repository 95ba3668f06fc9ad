//! Exit codes for the CLI

use gantry_core::ConfigError;
use gantry_publish::{BuildError, PipelineError, PublishError};
use gantry_signing::SigningError;

/// Success
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Build (packaging) failed
pub const BUILD_ERROR: i32 = 3;

/// Build succeeded but publishing failed
pub const PUBLISH_ERROR: i32 = 4;

/// Keychain provisioning or signing failed
pub const SIGNING_ERROR: i32 = 5;

fn for_publish_error(error: &PublishError) -> i32 {
    match error {
        PublishError::Configuration(_) => CONFIG_ERROR,
        _ => PUBLISH_ERROR,
    }
}

fn for_build_error(error: &BuildError) -> i32 {
    match error {
        BuildError::Step { source, .. } if source.downcast_ref::<SigningError>().is_some() => {
            SIGNING_ERROR
        }
        _ => BUILD_ERROR,
    }
}

/// Exit code for an error returned by a command
pub fn for_error(error: &anyhow::Error) -> i32 {
    if let Some(pipeline) = error.downcast_ref::<PipelineError>() {
        return match pipeline {
            PipelineError::Build(build) => for_build_error(build),
            PipelineError::Publish(publish) => for_publish_error(publish),
        };
    }
    if let Some(publish) = error.downcast_ref::<PublishError>() {
        return for_publish_error(publish);
    }
    if error.downcast_ref::<SigningError>().is_some() {
        return SIGNING_ERROR;
    }
    if error.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    ERROR
}
