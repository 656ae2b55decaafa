use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] backend::error::Error),
    #[error(transparent)]
    OpenCV(#[from] opencv::Error),
}
