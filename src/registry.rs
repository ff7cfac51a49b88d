//! 탐색된 호스트 레지스트리
//!
//! (주소, 포트) 기준 중복 제거, 최초 발견 순으로 1부터 ID 부여

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use parking_lot::Mutex;

use crate::{Error, Result};

/// 탐색된 피어
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    /// 비컨에 실린 호스트 이름
    pub name: String,

    /// 비컨 datagram의 송신 주소
    pub addr: IpAddr,

    /// 수신 대기 TCP 포트
    pub port: u16,
}

impl Host {
    pub fn new(name: impl Into<String>, addr: IpAddr, port: u16) -> Self {
        Self {
            name: name.into(),
            addr,
            port,
        }
    }

    /// 접속 대상 주소
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {}:{}", self.name, self.addr, self.port)
    }
}

/// 레지스트리 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: u64,
    pub host: Host,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    hosts: BTreeMap<u64, Host>,
    seen: HashMap<SocketAddr, u64>,
}

/// 호스트 레지스트리
///
/// 락은 중복 확인+삽입, 조회 동안에만 잡힘. I/O나 채널 전송 중에는 잡지 않음
#[derive(Debug)]
pub struct HostRegistry {
    inner: Mutex<Inner>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                hosts: BTreeMap::new(),
                seen: HashMap::new(),
            }),
        }
    }

    /// 호스트 삽입
    ///
    /// 새 호스트면 다음 ID를 부여하고 `(id, true)`,
    /// 이미 본 (주소, 포트)면 기존 ID와 `false` 반환
    pub fn insert(&self, host: Host) -> (u64, bool) {
        let key = host.socket_addr();
        let mut inner = self.inner.lock();

        if let Some(&id) = inner.seen.get(&key) {
            return (id, false);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.seen.insert(key, id);
        inner.hosts.insert(id, host);
        (id, true)
    }

    /// ID로 호스트 조회
    pub fn lookup(&self, id: u64) -> Result<Host> {
        self.inner
            .lock()
            .hosts
            .get(&id)
            .cloned()
            .ok_or(Error::HostNotFound(id))
    }

    /// ID 순 스냅샷
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.inner
            .lock()
            .hosts
            .iter()
            .map(|(&id, host)| RegistryEntry {
                id,
                host: host.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}
