use tracing::info;
use vppmux_api::MessageRegistry;
use vppmux_core::{Connection, MuxConfig};

use crate::cmd::{socket_adapter, WatchArgs};
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: WatchArgs, format: OutputFormat, config: MuxConfig) -> CliResult<i32> {
    let adapter = socket_adapter(&args.socket, config.reply_timeout)?;
    let (conn, mut events) = Connection::async_connect(adapter, MessageRegistry::new(), config)
        .map_err(|err| mux_error("connect failed", err))?;
    let socket = args.socket.display().to_string();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, disconnecting");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&socket, &event, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
        }
    }

    conn.disconnect().await;
    Ok(SUCCESS)
}
