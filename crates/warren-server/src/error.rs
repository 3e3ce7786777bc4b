use warren_db::DbError;
use warren_plugin::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("bad upstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}
