use std::sync::Arc;

use flora_client::NoopCallback;

use crate::cmd::{connect, parse_duration, GetArgs};
use crate::exit::{caps_error, client_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_replies, OutputFormat};
use crate::payload::build_caps;

pub fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = build_caps(&args.values).map_err(|err| caps_error("bad payload", err))?;

    let client = connect(&args.uri, Arc::new(NoopCallback))?;
    let response = client
        .get(&args.topic, &payload, timeout)
        .map_err(|err| client_error("get failed", err))?;
    client.destroy();

    // Partial replies are still printed; the exit code reports the cut-off.
    let code = if response.timed_out { TIMEOUT } else { SUCCESS };
    print_replies(&args.topic, response, format);
    Ok(code)
}
