use tracing::warn;

use crate::errors::EngineError;
use crate::host::SceneHost;

/// 在一个原子编辑内执行 `body`：成功提交，失败回滚。
///
/// 宿主不支持嵌套编辑，调用方需把所有子步骤合并到同一次调用中。
pub fn atomic<T, F>(host: &mut dyn SceneHost, label: &str, body: F) -> Result<T, EngineError>
where
    F: FnOnce(&mut dyn SceneHost) -> Result<T, EngineError>,
{
    host.begin_atomic_edit(label)?;
    match body(&mut *host) {
        Ok(value) => {
            if let Err(err) = host.commit_atomic_edit() {
                host.abort_atomic_edit();
                return Err(err.into());
            }
            Ok(value)
        }
        Err(err) => {
            warn!(label, error = %err, "原子编辑失败，已回滚");
            host.abort_atomic_edit();
            Err(err)
        }
    }
}
