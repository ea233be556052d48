//! APM trace agent.

use crate::error::FeatureError;
use crate::runner::context::CreateContext;

pub(super) fn before_create(ctx: &mut CreateContext<'_>) -> Result<(), FeatureError> {
    let enabled = ctx.options().features.apm_enabled;

    if enabled {
        tracing::info!("enabling apm agent");
    } else {
        tracing::info!("disabling apm agent");
    }

    // the agent image enables the trace agent by default, so always set it
    ctx.add_env("DD_APM_ENABLED", enabled.to_string())
}
