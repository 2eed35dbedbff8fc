// Library root
// -----------
// The binary (`main.rs`) is a thin wrapper around these modules.
//
// Module responsibilities:
// - `api`: HTTP interactions with Open WebUI (endpoint discovery, knowledge
//   collections, file upload and linking, batch orchestration).
// - `files`: the upload allow-list and the directory scanner.
// - `config`: client timing settings and the optional config file.
// - `error`: error kinds used inside the client.
// - `logging`: tracing subscriber setup.
// - `ui`: command line flags, progress display and the summary.
pub mod api;
pub mod config;
pub mod error;
pub mod files;
pub mod logging;
pub mod ui;
