use std::sync::Arc;

use flora_client::{MsgClass, NoopCallback};
use tracing::debug;

use crate::cmd::{connect, PostArgs};
use crate::exit::{caps_error, client_error, CliResult, SUCCESS};
use crate::payload::build_caps;

pub fn run(args: PostArgs) -> CliResult<i32> {
    let payload = build_caps(&args.values).map_err(|err| caps_error("bad payload", err))?;
    let class = if args.request {
        MsgClass::Request
    } else {
        MsgClass::Instant
    };

    let client = connect(&args.uri, Arc::new(NoopCallback))?;
    client
        .post(&args.topic, &payload, class)
        .map_err(|err| client_error("post failed", err))?;
    debug!(topic = %args.topic, entries = args.values.len(), "posted");
    client.destroy();

    Ok(SUCCESS)
}
