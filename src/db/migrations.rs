mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

use super::{Db, DbResult};

impl Db {
    /// Bring the crafting schema up to date. Safe to run on every start.
    pub async fn init(&self) -> DbResult<()> {
        let mut client = self.pool.get().await?;
        let report = embedded::migrations::runner().run_async(&mut **client).await?;

        for m in report.applied_migrations() {
            tracing::info!(version = m.version(), name = %m.name(), "applied migration");
        }

        Ok(())
    }
}
