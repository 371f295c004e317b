//! Role → connection-set registry.
//!
//! Every registered connection appears under exactly one role. Members are
//! held as `Weak` references so a connection dropped without `close` never
//! keeps its socket alive through the registry; such entries are skipped by
//! [`RoleRegistry::snapshot`]. Connections leave the registry through
//! `ClientConnection::close`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use relay_core::{ConnectionId, Role};
use tracing::debug;

use super::connection::ClientConnection;

#[derive(Default)]
struct Inner {
    members: HashMap<Role, HashMap<ConnectionId, Weak<ClientConnection>>>,
    index: HashMap<ConnectionId, Role>,
}

impl Inner {
    fn detach(&mut self, role: &Role, id: &ConnectionId) {
        if let Some(set) = self.members.get_mut(role) {
            let _ = set.remove(id);
            if set.is_empty() {
                let _ = self.members.remove(role);
            }
        }
    }
}

/// Concurrency-safe map from role to the connections registered under it.
///
/// Reads take a shared lock and copy out strong references, so callers never
/// run I/O while the lock is held.
#[derive(Default)]
pub struct RoleRegistry {
    inner: RwLock<Inner>,
}

impl RoleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` under `role`.
    ///
    /// A connection already present under another role is moved, never
    /// duplicated. Returns the role it was moved from, if any.
    pub fn insert(&self, role: Role, conn: &Arc<ClientConnection>) -> Option<Role> {
        let mut inner = self.inner.write();
        let previous = inner.index.insert(conn.id.clone(), role.clone());
        let moved_from = match previous {
            Some(prev) if prev != role => {
                inner.detach(&prev, &conn.id);
                Some(prev)
            }
            _ => None,
        };
        let _ = inner
            .members
            .entry(role)
            .or_default()
            .insert(conn.id.clone(), Arc::downgrade(conn));
        moved_from
    }

    /// Remove a connection from whichever role holds it.
    ///
    /// No-op (returns `None`) if the connection is not registered.
    pub fn remove(&self, id: &ConnectionId) -> Option<Role> {
        let mut inner = self.inner.write();
        let role = inner.index.remove(id)?;
        inner.detach(&role, id);
        debug!(conn_id = %id, role = %role, "removed from registry");
        Some(role)
    }

    /// Live, open connections currently registered under `role`.
    pub fn snapshot(&self, role: &Role) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner
            .members
            .get(role)
            .map(|set| {
                set.values()
                    .filter_map(Weak::upgrade)
                    .filter(|conn| conn.is_open())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Call `f` for each connection in a snapshot of `role`.
    ///
    /// The lock is released before the first call, so `f` may close
    /// connections or touch the registry. Returns the number visited.
    pub fn for_each(&self, role: &Role, mut f: impl FnMut(&Arc<ClientConnection>)) -> usize {
        let members = self.snapshot(role);
        for conn in &members {
            f(conn);
        }
        members.len()
    }

    /// The role a connection is registered under.
    pub fn role_of(&self, id: &ConnectionId) -> Option<Role> {
        self.inner.read().index.get(id).cloned()
    }

    /// Whether `id` is registered under `role`.
    pub fn contains(&self, role: &Role, id: &ConnectionId) -> bool {
        self.inner
            .read()
            .members
            .get(role)
            .is_some_and(|set| set.contains_key(id))
    }

    /// Number of entries under `role`.
    pub fn count(&self, role: &Role) -> usize {
        self.inner.read().members.get(role).map_or(0, HashMap::len)
    }

    /// Number of registered connections across all roles.
    pub fn total(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Per-role member counts, keyed by role name.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        self.inner
            .read()
            .members
            .iter()
            .map(|(role, set)| (role.to_string(), set.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    use crate::websocket::connection::Outbound;

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new(ConnectionId::new(), tx)), rx)
    }

    #[test]
    fn empty_registry() {
        let registry = RoleRegistry::new();
        assert_eq!(registry.total(), 0);
        assert!(registry.snapshot(&Role::Guest).is_empty());
        assert_eq!(registry.count(&Role::Studio), 0);
        assert!(registry.summary().is_empty());
    }

    #[test]
    fn insert_and_snapshot() {
        let registry = RoleRegistry::new();
        let (a, _ra) = make_connection();
        let (b, _rb) = make_connection();
        assert_eq!(registry.insert(Role::Studio, &a), None);
        assert_eq!(registry.insert(Role::Studio, &b), None);

        let snap = registry.snapshot(&Role::Studio);
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().any(|c| c.id == a.id));
        assert!(snap.iter().any(|c| c.id == b.id));
        assert!(registry.snapshot(&Role::Guest).is_empty());
    }

    #[test]
    fn insert_moves_between_roles() {
        let registry = RoleRegistry::new();
        let (conn, _rx) = make_connection();
        let _ = registry.insert(Role::Guest, &conn);
        assert_eq!(registry.insert(Role::Studio, &conn), Some(Role::Guest));

        assert!(!registry.contains(&Role::Guest, &conn.id));
        assert!(registry.contains(&Role::Studio, &conn.id));
        assert_eq!(registry.total(), 1);
        assert!(!registry.summary().contains_key("guest"));
    }

    #[test]
    fn reinsert_same_role_is_not_a_move() {
        let registry = RoleRegistry::new();
        let (conn, _rx) = make_connection();
        let _ = registry.insert(Role::Guest, &conn);
        assert_eq!(registry.insert(Role::Guest, &conn), None);
        assert_eq!(registry.count(&Role::Guest), 1);
    }

    #[test]
    fn remove_returns_role() {
        let registry = RoleRegistry::new();
        let (conn, _rx) = make_connection();
        let _ = registry.insert(Role::Studio, &conn);
        assert_eq!(registry.remove(&conn.id), Some(Role::Studio));
        assert_eq!(registry.total(), 0);
        assert_eq!(registry.count(&Role::Studio), 0);
    }

    #[test]
    fn remove_absent_is_noop() {
        let registry = RoleRegistry::new();
        let (conn, _rx) = make_connection();
        assert_eq!(registry.remove(&conn.id), None);
        let _ = registry.insert(Role::Guest, &conn);
        let _ = registry.remove(&conn.id);
        assert_eq!(registry.remove(&conn.id), None);
    }

    #[test]
    fn snapshot_skips_closed_connections() {
        let registry = RoleRegistry::new();
        let other = RoleRegistry::new();
        let (open, _r1) = make_connection();
        let (closed, _r2) = make_connection();
        let _ = registry.insert(Role::Studio, &open);
        let _ = registry.insert(Role::Studio, &closed);
        // Closed against a different registry, so the entry lingers here.
        let _ = closed.close(&other);

        let snap = registry.snapshot(&Role::Studio);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, open.id);
    }

    #[test]
    fn dropped_connections_are_skipped() {
        let registry = RoleRegistry::new();
        let (kept, _r1) = make_connection();
        let _ = registry.insert(Role::Guest, &kept);
        {
            let (gone, _r2) = make_connection();
            let _ = registry.insert(Role::Guest, &gone);
        }
        assert_eq!(registry.snapshot(&Role::Guest).len(), 1);
        assert_eq!(registry.count(&Role::Guest), 2);
        assert_eq!(registry.for_each(&Role::Guest, |_| {}), 1);
    }

    #[test]
    fn for_each_allows_mutation_during_iteration() {
        let registry = RoleRegistry::new();
        let conns: Vec<_> = (0..4).map(|_| make_connection()).collect();
        for (conn, _) in &conns {
            let _ = registry.insert(Role::Studio, conn);
        }

        let visited = registry.for_each(&Role::Studio, |conn| {
            let _ = conn.close(&registry);
        });

        assert_eq!(visited, 4);
        assert_eq!(registry.total(), 0);
    }

    #[test]
    fn summary_counts_roles() {
        let registry = RoleRegistry::new();
        let (g, _r1) = make_connection();
        let (s1, _r2) = make_connection();
        let (s2, _r3) = make_connection();
        let _ = registry.insert(Role::Guest, &g);
        let _ = registry.insert(Role::Studio, &s1);
        let _ = registry.insert(Role::Studio, &s2);

        let summary = registry.summary();
        assert_eq!(summary.get("guest"), Some(&1));
        assert_eq!(summary.get("studio"), Some(&2));
        assert_eq!(registry.role_of(&g.id), Some(Role::Guest));
    }

    #[test]
    fn concurrent_insert_and_remove() {
        let registry = Arc::new(RoleRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let (tx, _rx) = mpsc::channel(1);
                    let conn = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
                    let role = if i % 2 == 0 { Role::Guest } else { Role::Studio };
                    for _ in 0..100 {
                        let _ = registry.insert(role.clone(), &conn);
                        let _ = registry.snapshot(&role);
                        let _ = registry.remove(&conn.id);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.total(), 0);
        assert!(registry.summary().is_empty());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(usize, bool),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..6usize, any::<bool>()).prop_map(|(i, studio)| Op::Insert(i, studio)),
            (0..6usize).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn each_connection_in_at_most_one_role(ops in prop::collection::vec(op(), 0..64)) {
            let registry = RoleRegistry::new();
            let conns: Vec<_> = (0..6).map(|_| make_connection()).collect();

            for op in ops {
                match op {
                    Op::Insert(i, studio) => {
                        let role = if studio { Role::Studio } else { Role::Guest };
                        let _ = registry.insert(role, &conns[i].0);
                    }
                    Op::Remove(i) => {
                        let _ = registry.remove(&conns[i].0.id);
                    }
                }
            }

            for (conn, _) in &conns {
                let in_guest = registry.contains(&Role::Guest, &conn.id);
                let in_studio = registry.contains(&Role::Studio, &conn.id);
                prop_assert!(!(in_guest && in_studio));
                prop_assert_eq!(in_guest || in_studio, registry.role_of(&conn.id).is_some());
            }
            prop_assert_eq!(
                registry.total(),
                registry.count(&Role::Guest) + registry.count(&Role::Studio)
            );
        }
    }
}
