// Library root
// -----------
// Deploys Miva Script modules to a store's admin panel and compiles them
// with the external compiler. The binary (`main.rs`) only parses arguments
// and renders results; everything it does goes through these modules.
//
// Module responsibilities:
// - `config`: resolves credentials from a JSON file, env vars and flags.
// - `transport`: form requests and the cookie-keeping HTTP client.
// - `session`: login, sign-out detection, the single re-login retry and
//   the `json.mvc` API.
// - `modules`: upload/update operations and response classification.
// - `diagnostics` / `compiler`: runs `mvc` and parses its error output.
// - `log`: hierarchical event sink bridged to `tracing`.
// - `ui`: terminal rendering and prompts for the CLI.
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod log;
pub mod modules;
pub mod session;
pub mod transport;
pub mod ui;

pub use compiler::{CompileFailure, CompileOutput, Compiler, CompilerInvocation};
pub use config::{ConfigBuilder, Credentials};
pub use diagnostics::{parse_diagnostics, CompileErrorEntry, CompileFileMap};
pub use error::{Error, Result};
pub use log::Logger;
pub use modules::{
    deploy_module, update_module, upload_module, Failure, FailureCode, OperationResult,
};
pub use session::SessionManager;
