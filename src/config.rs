//! 런타임 설정

use std::path::PathBuf;

pub const DEFAULT_MAX_STACK: usize = 64 * 1024;
pub const DEFAULT_MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// 값 스택 최대 깊이
    pub max_stack: usize,
    /// 호출 프레임 최대 깊이
    pub max_frames: usize,
    /// `Some(n)`: 명령어 n개마다 GC 실행. `None`: 호스트가 직접 `gc()` 호출
    pub gc_interval: Option<u64>,
    /// `import`가 `<name>.mat`을 찾는 디렉터리 (앞에서부터)
    pub search_paths: Vec<PathBuf>,
    /// 명령어마다 `trace` 레벨 로그
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_stack: DEFAULT_MAX_STACK,
            max_frames: DEFAULT_MAX_FRAMES,
            gc_interval: None,
            search_paths: vec![PathBuf::from(".")],
            trace: false,
        }
    }
}

impl Config {
    /// `MSL_PATH`, `MSL_GC_INTERVAL`, `MSL_MAX_STACK` 환경 변수를 반영합니다.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(paths) = lookup("MSL_PATH") {
            config.search_paths.extend(
                paths
                    .split(':')
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            );
        }
        if let Some(n) = lookup("MSL_GC_INTERVAL").and_then(|s| s.trim().parse().ok()) {
            config.gc_interval = if n == 0 { None } else { Some(n) };
        }
        if let Some(n) = lookup("MSL_MAX_STACK").and_then(|s| s.trim().parse().ok()) {
            config.max_stack = n;
        }
        config
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_gc_interval(mut self, n: u64) -> Self {
        self.gc_interval = Some(n);
        self
    }
}
