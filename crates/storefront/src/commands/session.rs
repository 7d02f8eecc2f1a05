//! Session command.

use std::io::Write;

use vending_storefront::error::Result;
use vending_storefront::session::reset_session_id;
use vending_storefront::state::AppState;

pub fn session(state: &AppState, reset: bool) -> Result<()> {
    if reset {
        reset_session_id(state.store().as_ref())?;
        tracing::info!("Session token reset");
    }
    writeln!(std::io::stdout().lock(), "{}", state.session_id())?;
    Ok(())
}
