//! 回调隔离执行
//!
//! 在隔离环境中执行用户回调，捕获 panic 并通过服务日志器记录 panic 信息和简短的调用栈，
//! 不再向上传播

use crate::core::descriptor::ServiceLogger;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// 调用栈摘录保留的帧数
pub const STACK_DEPTH: usize = 4;

/// 隔离执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolatedOutcome {
    /// 回调正常返回
    Completed,
    /// 回调发生 panic，已被捕获并记录
    Panicked {
        /// panic 信息
        message: String,
        /// panic 位置和调用栈摘录
        stack: String,
    },
}

impl IsolatedOutcome {
    pub fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// panic hook 在发生 panic 的线程上收集的信息
struct CapturedPanic {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static ISOLATING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// 安装全局 panic hook（只安装一次）
///
/// 隔离执行期间的 panic 由 hook 记录位置和调用栈，并跳过默认输出；其余 panic 交给原有 hook 处理
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if ISOLATING.with(Cell::get) {
                let location = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                let backtrace = Backtrace::force_capture().to_string();
                CAPTURED.with(|captured| {
                    *captured.borrow_mut() = Some(CapturedPanic {
                        location,
                        backtrace,
                    });
                });
            } else {
                previous(info);
            }
        }));
    });
}

/// 隔离执行回调
///
/// # 参数
/// * `call` - 要执行的回调
/// * `logger` - panic 时用于记录严重日志的日志器
///
/// # 返回
/// * `IsolatedOutcome` - 执行结果，panic 不会继续传播
pub fn isolate<F>(call: F, logger: &dyn ServiceLogger) -> IsolatedOutcome
where
    F: FnOnce(),
{
    install_hook();

    let was_isolating = ISOLATING.with(|flag| flag.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(call));
    ISOLATING.with(|flag| flag.set(was_isolating));

    let payload = match result {
        Ok(()) => return IsolatedOutcome::Completed,
        Err(payload) => payload,
    };

    let message = panic_message(payload.as_ref());
    let captured = CAPTURED.with(|captured| captured.borrow_mut().take());
    let stack = match captured {
        Some(captured) => stack_excerpt(captured.location.as_deref(), &captured.backtrace),
        None => String::new(),
    };

    logger.critical(&format!("panic: {message}\n{stack}"));
    IsolatedOutcome::Panicked { message, stack }
}

/// 提取 panic 负载中的文本信息
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知的 panic 负载".to_string()
    }
}

/// 生成调用栈摘录：panic 位置加上最多 [`STACK_DEPTH`] 个用户代码帧
fn stack_excerpt(location: Option<&str>, backtrace: &str) -> String {
    let mut lines = Vec::with_capacity(STACK_DEPTH + 1);
    if let Some(location) = location {
        lines.push(format!("at {location}"));
    }

    lines.extend(
        parse_frames(backtrace)
            .into_iter()
            .filter(|frame| !is_runtime_frame(&frame.symbol))
            .take(STACK_DEPTH)
            .map(|frame| match frame.source {
                Some(source) => format!("{} ({})", frame.symbol, source),
                None => frame.symbol,
            }),
    );

    lines.join("\n")
}

struct Frame {
    symbol: String,
    source: Option<String>,
}

/// 解析 `Backtrace` 的文本格式：`  N: symbol` 后面可能跟着一行 `at file:line:col`
fn parse_frames(backtrace: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();

    for line in backtrace.lines() {
        let line = line.trim();
        if let Some(source) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                if last.source.is_none() {
                    last.source = Some(source.to_string());
                }
            }
            continue;
        }

        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
            frames.push(Frame {
                symbol: symbol.to_string(),
                source: None,
            });
        }
    }

    frames
}

/// 标准库、panic 处理和本模块自身的帧
fn is_runtime_frame(symbol: &str) -> bool {
    const PREFIXES: [&str; 6] = ["std::", "core::", "alloc::", "__rust", "rust_", "<alloc::"];

    PREFIXES.iter().any(|prefix| symbol.starts_with(prefix))
        || symbol.contains("panicking")
        || symbol.contains("core::isolation::")
        || symbol.starts_with("<core::panic::")
}
