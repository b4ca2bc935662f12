//! Open lifecycle and proxy streams
//!
//! Opening resolves storage first (an explicitly supplied instance, then a
//! parent handle's, then the on-disk store under `<dir>/.dat/db`) and then
//! the starting position (a checkout head, a named layer, the recorded
//! default layer, or nothing for an empty store).
//!
//! Stream-returning calls cannot wait for the open, so before it completes
//! they hand out a proxy that awaits the open and then continues as the
//! real stream. Dropping the proxy drops whatever it wraps; an open failure
//! arrives as the proxy's only item.

use crate::db::Db;
use crate::error::{Error, Result};
use crate::options::DbOptions;
use crate::session::Session;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use strata_common::Config;
use strata_common::config::{DAT_DIR, store_path};
use strata_common::keys::validate_key;
use strata_log::{LogError, RedbLog, Storage};
use tracing::{debug, info};

/// Open `<dir>/.dat/db`, creating it only when allowed
pub(crate) fn open_store(dir: &Path, config: &Config) -> Result<Arc<dyn Storage>> {
    let dat = dir.join(DAT_DIR);
    if !dat.exists() {
        if !config.storage.create_if_missing {
            return Err(Error::invalid_argument(format!(
                "No dat here: {}",
                dir.display()
            )));
        }
        std::fs::create_dir_all(&dat).map_err(LogError::from)?;
        info!(path = %dat.display(), "created store directory");
    }
    Ok(Arc::new(RedbLog::open(store_path(dir), config)?))
}

pub(crate) async fn open_session(options: &DbOptions, dir: Option<&Path>) -> Result<Session> {
    let storage = if let Some(storage) = &options.storage {
        Arc::clone(storage)
    } else if let Some(parent) = &options.parent {
        Arc::clone(&parent.session().await?.storage)
    } else if let Some(dir) = dir {
        open_store(dir, &options.config)?
    } else {
        return Err(Error::invalid_argument("Invalid path"));
    };

    let dataset = match &options.dataset {
        Some(name) if !name.is_empty() => {
            validate_key(name)?;
            name.clone()
        }
        _ => String::new(),
    };
    let buffer = options.config.streams.buffer.max(1);

    if let Some(head) = &options.checkout {
        debug!(head = %head, "opening checkout");
        return Session::at(storage, head.clone(), true, dataset, buffer).await;
    }

    if let Some(layer) = &options.layer {
        let head = storage
            .head(layer)
            .await?
            .ok_or_else(|| LogError::LayerNotFound(layer.to_string()))?;
        debug!(layer = %layer, head = %head, "opening layer");
        return Session::at(storage, head, true, dataset, buffer).await;
    }

    if let Some(main) = storage.main_layer().await? {
        let head = storage
            .head(&main)
            .await?
            .ok_or_else(|| LogError::LayerNotFound(main.to_string()))?;
        return Session::at(storage, head, false, dataset, buffer).await;
    }

    Ok(Session::empty(storage, dataset, buffer))
}

/// Stream produced by `make` once the handle is open
pub(crate) fn proxy_stream<T, F>(db: &Db, make: F) -> BoxStream<'static, Result<T>>
where
    T: Send + 'static,
    F: FnOnce(Arc<Session>) -> BoxStream<'static, Result<T>> + Send + 'static,
{
    if let Some(session) = db.opened() {
        return make(session);
    }

    let db = db.clone();
    stream::once(async move {
        match db.session().await {
            Ok(session) => make(session),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    })
    .flatten()
    .boxed()
}
