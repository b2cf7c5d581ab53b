use anyhow::Result;
use tracing_subscriber::fmt;

/// Installs the stderr subscriber when verbose output is requested.
/// Quiet runs install nothing and stay silent.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_init_succeeds_without_a_subscriber() {
        init(false).expect("init");
        assert!(!tracing::dispatcher::has_been_set());
    }
}
