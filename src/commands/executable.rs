use async_trait::async_trait;

use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

#[async_trait]
pub trait Executable {
    async fn exec(self, store: Store) -> Result<Frame, Error>;
}
