pub mod server;

// Internal "interpreter" for `Action`; the match lives in its own module so
// this one stays small as actions are added.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(Box<server::Args>),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
