//! PID 文件互斥锁
//!
//! 通过独占的 PID 文件保证同一路径在本机只运行一个服务实例，并识别崩溃进程遗留的失效锁。
//!
//! 判定顺序：
//! 1. 文件中记录的 PID 对应的进程仍存活 -> 已在运行（快速路径，也便于诊断）
//! 2. 无法获得非阻塞的独占 `flock` -> 已在运行（锁才是权威判据）
//! 3. 否则截断文件并写入当前 PID，在进程生命周期内持有文件句柄和锁

use crate::error::PidError;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 读取旧 PID 时最多读取的字节数
const MAX_PID_BYTES: u64 = 1024;

/// 已持有的 PID 文件锁
///
/// 文件句柄和 `flock` 一直保持到 guard 被释放或进程退出
pub struct PidGuard {
    /// PID 文件路径
    path: PathBuf,
    /// 写入文件的进程 ID
    pid: u32,
    /// 持锁的文件句柄
    file: Flock<File>,
}

impl PidGuard {
    /// 获取 PID 文件锁
    ///
    /// # 参数
    /// * `path` - PID 文件路径，为空时使用 `<home>/run/<可执行文件名>.pid`
    ///
    /// # 返回
    /// * `Result<Self, PidError>` - 另一个实例在运行时返回 `AlreadyRunning` 或 `LockHeld`
    pub fn acquire(path: Option<&Path>) -> Result<Self, PidError> {
        let path = match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => path.to_path_buf(),
            None => default_pid_path().ok_or(PidError::BlankPath)?,
        };

        // 确保目录存在
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| PidError::DirCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(&path)
            .map_err(|source| PidError::Open {
                path: path.clone(),
                source,
            })?;

        let pid = std::process::id();

        if let Some(last_pid) = read_pid_from(&mut file, &path) {
            debug!("上一次的 PID: {}", last_pid);
            if last_pid != pid && is_process_alive(last_pid) {
                return Err(PidError::AlreadyRunning {
                    pid: last_pid,
                    path,
                });
            }
        }

        let mut file = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((file, errno)) => {
                drop(file);
                return Err(PidError::LockHeld {
                    path,
                    source: errno.into(),
                });
            }
        };

        write_pid(&mut file, pid).map_err(|source| PidError::Write {
            path: path.clone(),
            source,
        })?;

        info!("已写入 PID {} 到文件 {}", pid, path.display());
        Ok(Self { path, pid, file })
    }

    /// PID 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 写入文件的进程 ID
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl std::fmt::Debug for PidGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidGuard")
            .field("path", &self.path)
            .field("pid", &self.pid)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

impl Drop for PidGuard {
    // 锁随 `Flock` 一起释放，文件本身保留
    fn drop(&mut self) {
        debug!("释放PID文件锁: {}", self.path.display());
    }
}

/// 默认 PID 文件路径: `<home>/run/<可执行文件名>.pid`
pub fn default_pid_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let exe = std::env::args_os()
        .next()
        .and_then(|arg0| Path::new(&arg0).file_name().map(|name| name.to_owned()))?;
    let mut file_name = exe;
    file_name.push(".pid");
    Some(home.join("run").join(file_name))
}

/// 读取 PID 文件中的进程 ID（不加锁）
pub fn read_pid<P: AsRef<Path>>(path: P) -> Option<u32> {
    let path = path.as_ref();
    let mut file = File::open(path).ok()?;
    read_pid_from(&mut file, path)
}

/// 通过零信号探测进程是否存活
///
/// 没有权限向该进程发送信号（EPERM）同样说明进程存在
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn read_pid_from(file: &mut File, path: &Path) -> Option<u32> {
    let mut content = String::new();
    if let Err(e) = file.take(MAX_PID_BYTES).read_to_string(&mut content) {
        warn!("读取PID文件失败 {}: {}", path.display(), e);
        return None;
    }

    let content = content.trim();
    if content.is_empty() {
        return None;
    }
    match content.parse::<u32>() {
        Ok(pid) => Some(pid),
        Err(_) => {
            warn!("PID文件内容不是整数: {}", path.display());
            None
        }
    }
}

fn write_pid(file: &mut File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{pid}")?;
    file.flush()?;
    file.sync_all()
}
