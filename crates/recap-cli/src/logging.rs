use recap_common::RedactingWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default `info`
/// level. Output goes to stderr with API keys scrubbed, so stdout stays free
/// for streamed summaries.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
