use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "billing_service=info";

/// Install the global fmt subscriber. `RUST_LOG` applies first, then the
/// default directive, then `extra` (usually the `[log] filter` setting).
pub fn init_tracing(extra: Option<&str>) {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_DIRECTIVE.parse() {
        filter = filter.add_directive(directive);
    }
    for directive in extra.into_iter().flat_map(|s| s.split(',')) {
        match directive.trim().parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("ignoring log directive '{directive}': {e}"),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
