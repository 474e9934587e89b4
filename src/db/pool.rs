use super::{Db, DbResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::str::FromStr;
use tokio_postgres::NoTls;

impl Db {
    /// Connection pool against `url` holding at most `max_size` connections
    pub fn new(url: &str, max_size: usize) -> DbResult<Self> {
        let cfg = tokio_postgres::Config::from_str(url)?;

        let mgr = Manager::from_config(
            cfg,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Verified,
            },
        );

        let pool = Pool::builder(mgr)
            .max_size(max_size.max(1))
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self { pool })
    }
}
