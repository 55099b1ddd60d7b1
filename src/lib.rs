/*!
ecui-runner: run host commands or configured scripts over HTTP.

`POST /execute` resolves a command (executable search path, then the scripts directory),
materializes `tmp-file-path` placeholders into fresh temp files, streams the merged
output live, enforces a wall-clock timeout and, after a zero exit, advertises the
requested temp files. `GET /download/<name>` hands those files back.

Embedding:

```no_run
use std::time::Duration;
use ecui_runner::{start_gateway, GatewayConfig};

let cfg = GatewayConfig::new("/config/scripts")
    .port(8000)
    .timeout(Duration::from_secs(60));
let handle = start_gateway(cfg)?;
println!("listening on {}", handle.url());
handle.join();
# Ok::<(), std::io::Error>(())
```
*/

pub mod config;
pub mod errors;
pub mod gateway;
pub mod telemetry;

pub use config::GatewayConfig;
pub use errors::{exit_code_for_io_error, GatewayError};
pub use gateway::{start_gateway, GatewayHandle};
pub use telemetry::telemetry_init;
