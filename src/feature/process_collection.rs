//! Live process collection through the process agent.

use crate::container::AccessMode;
use crate::error::FeatureError;
use crate::runner::context::CreateContext;

pub(super) fn before_create(ctx: &mut CreateContext<'_>) -> Result<(), FeatureError> {
    if !ctx.options().features.process_collection_enabled {
        return Ok(());
    }

    tracing::info!("enabling process collection");

    ctx.add_env("DD_PROCESS_AGENT_ENABLED", "true")?;
    // resolves process owners to user names
    ctx.add_bind_mount("/etc/passwd", "/etc/passwd", AccessMode::ReadOnly)?;

    Ok(())
}
