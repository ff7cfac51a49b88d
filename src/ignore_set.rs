//! 전송 루트의 무시 규칙
//!
//! gitignore 문법. 전송 한 번마다 만들고 버림

use std::io::ErrorKind;
use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

/// 컴파일된 무시 패턴 집합
#[derive(Debug)]
pub struct IgnoreSet {
    matcher: Gitignore,
}

impl IgnoreSet {
    /// `<root>/<file_name>`에서 규칙 로드
    ///
    /// 파일이 없거나 읽을 수 없으면 빈 집합
    pub async fn load(root: &Path, file_name: &str) -> Self {
        let rules_path = root.join(file_name);
        let text = match tokio::fs::read_to_string(&rules_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::empty(),
            Err(e) => {
                warn!("무시 규칙 읽기 실패 ({}): {}", rules_path.display(), e);
                return Self::empty();
            }
        };

        let mut builder = GitignoreBuilder::new(root);
        for line in text.lines() {
            if let Err(e) = builder.add_line(Some(rules_path.clone()), line) {
                warn!("무시 패턴 무시됨 {:?} ({}): {}", line, rules_path.display(), e);
            }
        }

        match builder.build() {
            Ok(matcher) => {
                debug!(
                    "무시 규칙 {}개 로드: {}",
                    matcher.num_ignores(),
                    rules_path.display()
                );
                Self { matcher }
            }
            Err(e) => {
                warn!("무시 규칙 컴파일 실패 ({}): {}", rules_path.display(), e);
                Self::empty()
            }
        }
    }

    /// 패턴 줄에서 직접 생성
    pub fn from_lines<'a>(root: &Path, lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        for line in lines {
            if let Err(e) = builder.add_line(None, line) {
                warn!("무시 패턴 무시됨 {:?}: {}", line, e);
            }
        }
        match builder.build() {
            Ok(matcher) => Self { matcher },
            Err(_) => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    /// 루트 기준 상대 경로가 무시 대상인지
    ///
    /// 디렉터리가 걸리면 호출자가 하위 트리 전체를 건너뜀
    pub fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        self.matcher.matched(relative, is_dir).is_ignore()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }
}
