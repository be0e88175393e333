use super::{Action, server};
use anyhow::Result;

pub(super) async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(*args).await,
    }
}
