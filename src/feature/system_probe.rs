//! System probe, shared by process stats and network performance monitoring.

use crate::container::AccessMode;
use crate::error::FeatureError;
use crate::runner::context::CreateContext;

pub(super) fn before_create(ctx: &mut CreateContext<'_>) -> Result<(), FeatureError> {
    let features = ctx.options().features;

    if !(features.process_collection_enabled || features.network_performance_monitoring_enabled) {
        return Ok(());
    }

    ctx.add_env("DD_SYSTEM_PROBE_ENABLED", "true")?;
    ctx.add_bind_mount(
        "/sys/kernel/debug",
        "/sys/kernel/debug",
        AccessMode::ReadWrite,
    )?;

    if features.process_collection_enabled {
        tracing::info!("enabling system probe process stats");
        ctx.add_env("DD_SYSTEM_PROBE_PROCESS_ENABLED", "true")?;
    }

    if features.network_performance_monitoring_enabled {
        tracing::info!("enabling network performance monitoring");
        ctx.add_env("DD_SYSTEM_PROBE_NETWORK_ENABLED", "true")?;
    }

    Ok(())
}
