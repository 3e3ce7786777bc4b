//! Plays a random sound from a per-bunny folder at a fixed interval, when
//! the bunny is idle.
//!
//! Per-bunny settings (namespace `surprise`): `frequency` in seconds and
//! `folder`, a sub-directory of the plugin's HTTP folder.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use warren_db::{Access, Account, Bunny, Category, EntityId};

use crate::api::{ApiAnswer, ApiCall, ApiError, ApiResult};
use crate::host_functions::HostContext;
use crate::http::HttpRequest;
use crate::packet::Packet;
use crate::plugin::{Plugin, PluginType};

pub const NAME: &str = "surprise";

const FREQUENCY: &str = "frequency";
const FOLDER: &str = "folder";

#[derive(Default)]
pub struct Surprise {
    host: OnceLock<HostContext>,
    timers: Mutex<HashMap<EntityId, JoinHandle<()>>>,
}

pub fn create() -> Box<dyn Plugin> {
    Box::new(Surprise::default())
}

fn frequency(bunny: &Bunny) -> Option<u64> {
    bunny
        .settings()
        .get_u64(NAME, FREQUENCY)
        .filter(|f| *f > 0)
}

/// Names of the sub-directories of `dir`, sorted.
fn folders(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

async fn files(dir: &Path) -> Vec<String> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    names
}

async fn play(host: &HostContext, bunny: &Bunny) {
    if !bunny.is_idle() {
        return;
    }
    let Some(folder) = bunny.settings().get_str(NAME, FOLDER) else {
        host.log_error("Invalid surprise config");
        return;
    };
    let available = files(&host.local_http_folder().join(&folder)).await;
    if available.is_empty() {
        return;
    }
    let file = &available[rand::random_range(0..available.len())];
    let url = host.broadcast_url(&format!("{folder}/{file}"));
    let program = format!("MU {url}\nPL 3\nMW\n");
    if !bunny.send_packet(Packet::message(program).encode()) {
        tracing::debug!(bunny = %bunny.id(), "surprise dropped, bunny went away");
    }
}

impl Surprise {
    fn arm(&self, bunny: &Arc<Bunny>) {
        self.disarm(bunny.id());
        let Some(host) = self.host.get() else {
            return;
        };
        let Some(period) = frequency(bunny) else {
            host.log_error(&format!("Bunny '{}' has invalid frequency", bunny.id()));
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            host.log_warn("no async runtime, timer not armed");
            return;
        };

        let host = host.clone();
        let target = bunny.clone();
        let task = runtime.spawn(async move {
            let mut period = period;
            loop {
                tokio::time::sleep(Duration::from_secs(period)).await;
                play(&host, &target).await;
                match frequency(&target) {
                    Some(next) => period = next,
                    None => break,
                }
            }
        });
        self.timers.lock().insert(bunny.id().clone(), task);
    }

    fn disarm(&self, id: &EntityId) {
        if let Some(task) = self.timers.lock().remove(id) {
            task.abort();
        }
    }

    fn armed(&self, id: &EntityId) -> bool {
        self.timers.lock().contains_key(id)
    }
}

impl Drop for Surprise {
    fn drop(&mut self) {
        for (_, task) in self.timers.lock().drain() {
            task.abort();
        }
    }
}

impl Plugin for Surprise {
    fn name(&self) -> &str {
        NAME
    }

    fn visual_name(&self) -> &str {
        "Send random mp3 at random intervals"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::BunnyPlugin
    }

    fn init(&self, host: HostContext) -> bool {
        self.host.set(host).is_ok()
    }

    fn on_bunny_connect(&self, bunny: &Arc<Bunny>) {
        self.arm(bunny);
    }

    fn on_bunny_disconnect(&self, bunny: &Arc<Bunny>) {
        self.disarm(bunny.id());
    }

    fn bunny_api_calls(&self) -> Vec<ApiCall> {
        vec![
            ApiCall::new("setFolder(name)", Category::Bunnies, Access::Write),
            ApiCall::new("getFolderList()", Category::Bunnies, Access::Read),
            ApiCall::new("setFrequency(value)", Category::Bunnies, Access::Write),
        ]
    }

    fn bunny_api_call(
        &self,
        call: &str,
        _account: &Account,
        bunny: &Arc<Bunny>,
        req: &HttpRequest,
    ) -> ApiResult {
        let host = self
            .host
            .get()
            .ok_or_else(|| ApiError::new("Plugin not initialized"))?;
        match call {
            "getFolderList" => Ok(ApiAnswer::list(folders(&host.local_http_folder()))),
            "setFolder" => {
                let folder = req.require("name")?;
                if !folders(&host.local_http_folder()).iter().any(|f| f == folder) {
                    return Err(ApiError::new(format!("Unknown '{folder}' folder")));
                }
                bunny.settings().set(NAME, FOLDER, folder);
                Ok(ApiAnswer::ok(format!("Folder changed to '{folder}'")))
            }
            "setFrequency" => {
                let value: u64 = req
                    .require("value")?
                    .parse()
                    .map_err(|_| ApiError::new("Invalid frequency"))?;
                bunny.settings().set(NAME, FREQUENCY, value);
                if bunny.is_connected() && bunny.bound_plugins().iter().any(|p| p == NAME) {
                    self.disarm(bunny.id());
                    self.arm(bunny);
                }
                Ok(ApiAnswer::ok("Plugin configuration updated."))
            }
            other => Err(ApiError::new(format!("Unknown api call : {other}"))),
        }
    }
}
