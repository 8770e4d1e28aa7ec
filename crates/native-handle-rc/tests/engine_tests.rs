use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use native_handle_rc::{
   CloseStrategy, Error, Finalizer, Handle, HandleState, NativeError, Owner, Release, acquire,
   release,
};
use proptest::prelude::*;

/// Shared record of native closes, in order.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
   fn entries(&self) -> Vec<String> {
      self.0.lock().unwrap().clone()
   }

   fn closes_of(&self, name: &str) -> usize {
      self.0.lock().unwrap().iter().filter(|e| *e == name).count()
   }

   fn position(&self, name: &str) -> Option<usize> {
      self.0.lock().unwrap().iter().position(|e| e == name)
   }
}

struct Resource {
   name: String,
   journal: Journal,
   fail_close: Option<i64>,
}

fn resource(name: &str, journal: &Journal) -> Resource {
   Resource {
      name: name.to_string(),
      journal: journal.clone(),
      fail_close: None,
   }
}

fn close_resource(res: &mut Resource) -> Result<(), NativeError> {
   res.journal.0.lock().unwrap().push(res.name.clone());
   match res.fail_close {
      Some(code) => Err(NativeError::new(code, format!("cannot close {}", res.name))),
      None => Ok(()),
   }
}

fn close_panicking(res: &mut Resource) -> Result<(), NativeError> {
   res.journal.0.lock().unwrap().push(res.name.clone());
   panic!("native library aborted close of {}", res.name)
}

const CONNECTION: Finalizer<Resource> = Finalizer::new("connection", close_resource);
const STATEMENT: Finalizer<Resource> = Finalizer::new("statement", close_resource);
const RESULT_SET: Finalizer<Resource> = Finalizer::new("result set", close_resource);

#[test]
fn test_single_close_under_concurrent_acquire_release() {
   let journal = Journal::default();
   let handle = Handle::new(resource("root", &journal), CONNECTION);
   acquire(&*handle).unwrap();

   let threads = 8;
   let rounds = 500;
   let barrier = Arc::new(Barrier::new(threads));

   let workers: Vec<_> = (0..threads)
      .map(|_| {
         let handle = Arc::clone(&handle);
         let barrier = Arc::clone(&barrier);
         thread::spawn(move || {
            barrier.wait();
            for _ in 0..rounds {
               acquire(&*handle).unwrap();
            }
            for _ in 0..rounds {
               let outcome = release(&*handle).unwrap();
               assert!(matches!(outcome, Release::Retained { .. }));
            }
         })
      })
      .collect();

   for worker in workers {
      worker.join().unwrap();
   }

   assert_eq!(handle.ref_count(), 1);
   assert!(journal.entries().is_empty());

   assert_eq!(release(&*handle).unwrap(), Release::Closed);
   assert_eq!(journal.closes_of("root"), 1);
}

#[test]
fn test_concurrent_releases_close_once() {
   let journal = Journal::default();
   let handle = Handle::new(resource("root", &journal), CONNECTION);

   let threads = 16;
   for _ in 0..threads {
      acquire(&*handle).unwrap();
   }

   let barrier = Arc::new(Barrier::new(threads));
   let workers: Vec<_> = (0..threads)
      .map(|_| {
         let handle = Arc::clone(&handle);
         let barrier = Arc::clone(&barrier);
         thread::spawn(move || {
            barrier.wait();
            release(&*handle).unwrap()
         })
      })
      .collect();

   let closed = workers
      .into_iter()
      .map(|w| w.join().unwrap())
      .filter(|r| *r == Release::Closed)
      .count();

   assert_eq!(closed, 1);
   assert_eq!(journal.closes_of("root"), 1);
   assert_eq!(handle.state(), HandleState::Closed);
}

#[test]
fn test_release_at_zero_is_idempotent() {
   let journal = Journal::default();
   let handle = Handle::new(resource("root", &journal), CONNECTION);
   acquire(&*handle).unwrap();

   assert_eq!(release(&*handle).unwrap(), Release::Closed);
   for _ in 0..3 {
      assert_eq!(release(&*handle).unwrap(), Release::AlreadyReleased);
   }

   assert_eq!(journal.closes_of("root"), 1);
   assert_eq!(handle.ref_count(), 0);
}

#[test]
fn test_parent_survives_live_children() {
   let journal = Journal::default();
   let parent = Handle::new(resource("parent", &journal), CONNECTION);
   acquire(&*parent).unwrap();
   acquire(&*parent).unwrap();
   let before = parent.ref_count();

   let child = parent.adopt(resource("child", &journal), STATEMENT).unwrap();
   assert_eq!(parent.ref_count(), before + 1);

   // Extra references on the child do not count again on the parent
   acquire(&*child).unwrap();
   assert_eq!(parent.ref_count(), before + 1);

   release(&*child).unwrap();
   assert_eq!(release(&*child).unwrap(), Release::Closed);

   assert_eq!(parent.ref_count(), before);
   assert!(parent.is_live());
   assert_eq!(journal.entries(), vec!["child"]);
}

#[test]
fn test_use_after_close_is_rejected() {
   let journal = Journal::default();
   let handle = Handle::new(resource("root", &journal), CONNECTION);
   acquire(&*handle).unwrap();
   release(&*handle).unwrap();

   let touched = Mutex::new(false);
   let err = handle
      .with_native(|_| *touched.lock().unwrap() = true)
      .unwrap_err();

   assert!(matches!(err, Error::InvalidState { kind: "connection" }));
   assert!(!*touched.lock().unwrap());

   let err = handle.with_parent_native("statement", |_| ()).unwrap_err();
   assert!(matches!(
      err,
      Error::ParentInvalid {
         kind: "statement",
         parent: "connection"
      }
   ));
}

#[test]
fn test_parent_released_before_child() {
   let journal = Journal::default();
   let parent = Handle::new(resource("parent", &journal), CONNECTION);
   acquire(&*parent).unwrap();
   let child = parent.adopt(resource("child", &journal), STATEMENT).unwrap();

   assert_eq!(release(&*parent).unwrap(), Release::Retained { remaining: 1 });
   assert!(parent.is_live());
   assert!(child.with_native(|_| ()).is_ok());

   assert_eq!(release(&*child).unwrap(), Release::Closed);
   assert_eq!(journal.entries(), vec!["child", "parent"]);
   assert_eq!(parent.state(), HandleState::Closed);
}

#[test]
fn test_root_with_two_sibling_children() {
   let journal = Journal::default();
   let r = Handle::new(resource("R", &journal), CONNECTION);
   acquire(&*r).unwrap();

   let a = r.adopt(resource("A", &journal), STATEMENT).unwrap();
   let b = r.adopt(resource("B", &journal), STATEMENT).unwrap();
   assert_eq!(r.ref_count(), 3);

   assert_eq!(release(&*r).unwrap(), Release::Retained { remaining: 2 });
   assert_eq!(release(&*a).unwrap(), Release::Closed);
   assert_eq!(r.ref_count(), 1);
   assert!(journal.position("R").is_none());

   assert_eq!(release(&*b).unwrap(), Release::Closed);
   assert_eq!(r.ref_count(), 0);

   let a_at = journal.position("A").unwrap();
   let b_at = journal.position("B").unwrap();
   let r_at = journal.position("R").unwrap();
   assert!(a_at < r_at);
   assert!(b_at < r_at);
   assert_eq!(journal.entries().len(), 3);
}

#[test]
fn test_end_to_end_root_child_grandchild() {
   let journal = Journal::default();
   let r = Handle::new(resource("R", &journal), CONNECTION);
   acquire(&*r).unwrap();
   assert_eq!(r.ref_count(), 1);

   let a = r.adopt(resource("A", &journal), STATEMENT).unwrap();
   assert_eq!(a.ref_count(), 1);
   assert_eq!(r.ref_count(), 2);

   let b = a.adopt(resource("B", &journal), RESULT_SET).unwrap();
   assert_eq!(b.ref_count(), 1);
   assert_eq!(a.ref_count(), 2);
   assert_eq!(r.ref_count(), 2);

   assert_eq!(release(&*b).unwrap(), Release::Closed);
   assert_eq!(a.ref_count(), 1);
   assert_eq!(r.ref_count(), 2);
   assert!(a.is_live());

   assert_eq!(release(&*a).unwrap(), Release::Closed);
   assert_eq!(r.ref_count(), 1);
   assert!(r.is_live());

   assert_eq!(release(&*r).unwrap(), Release::Closed);
   assert_eq!(journal.entries(), vec!["B", "A", "R"]);
   assert!(journal.position("A").unwrap() < journal.position("R").unwrap());
}

#[test]
fn test_three_level_cascade() {
   let journal = Journal::default();
   let conn = Handle::new(resource("conn", &journal), CONNECTION);
   acquire(&*conn).unwrap();
   let stmt = conn.adopt(resource("stmt", &journal), STATEMENT).unwrap();
   let rows = stmt.adopt(resource("rows", &journal), RESULT_SET).unwrap();

   release(&*conn).unwrap();
   release(&*stmt).unwrap();
   assert!(journal.entries().is_empty());

   assert_eq!(release(&*rows).unwrap(), Release::Closed);
   assert_eq!(journal.entries(), vec!["rows", "stmt", "conn"]);
   assert_eq!(rows.parent_id(), None);
}

#[test]
fn test_close_failure_surfaces_and_still_cascades() {
   let journal = Journal::default();
   let parent = Handle::new(resource("parent", &journal), CONNECTION);
   acquire(&*parent).unwrap();

   let mut failing = resource("child", &journal);
   failing.fail_close = Some(-7);
   let child = parent.adopt(failing, STATEMENT).unwrap();
   release(&*parent).unwrap();

   let err = release(&*child).unwrap_err();
   assert!(matches!(
      err,
      Error::NativeClose {
         kind: "statement",
         code: -7,
         ..
      }
   ));

   // The native is gone and the parent was released anyway
   assert!(matches!(
      child.with_native(|_| ()),
      Err(Error::InvalidState { .. })
   ));
   assert_eq!(journal.entries(), vec!["child", "parent"]);
   assert_eq!(release(&*child).unwrap(), Release::AlreadyReleased);
}

#[test]
fn test_panicking_close_is_contained() {
   let journal = Journal::default();
   let handle = Handle::new(
      resource("root", &journal),
      Finalizer::new("connection", close_panicking),
   );
   acquire(&*handle).unwrap();

   let err = release(&*handle).unwrap_err();

   match err {
      Error::ClosePanicked { kind, message } => {
         assert_eq!(kind, "connection");
         assert!(message.contains("aborted close of root"));
      }
      other => panic!("unexpected error: {other:?}"),
   }
   assert_eq!(handle.state(), HandleState::Closed);
   assert_eq!(journal.closes_of("root"), 1);
}

#[test]
fn test_owners_finalized_in_any_order() {
   let journal = Journal::default();
   let conn = Owner::root(resource("conn", &journal), CONNECTION, CloseStrategy::Strict).unwrap();
   let stmt = conn.adopt(resource("stmt", &journal), STATEMENT).unwrap();
   let rows = stmt.adopt(resource("rows", &journal), RESULT_SET).unwrap();

   // Host sweeps parents first
   drop(conn);
   drop(stmt);
   assert!(journal.entries().is_empty());

   drop(rows);
   assert_eq!(journal.entries(), vec!["rows", "stmt", "conn"]);
}

#[test]
fn test_concurrent_finalization_of_siblings() {
   let journal = Journal::default();
   let conn = Owner::root(resource("conn", &journal), CONNECTION, CloseStrategy::Strict).unwrap();

   let children: Vec<_> = (0..32)
      .map(|i| {
         let name = format!("stmt-{i}");
         conn.adopt(resource(&name, &journal), STATEMENT).unwrap()
      })
      .collect();
   assert_eq!(conn.ref_count(), 33);
   drop(conn);

   let barrier = Arc::new(Barrier::new(children.len()));
   let workers: Vec<_> = children
      .into_iter()
      .map(|child| {
         let barrier = Arc::clone(&barrier);
         thread::spawn(move || {
            barrier.wait();
            drop(child);
         })
      })
      .collect();
   for worker in workers {
      worker.join().unwrap();
   }

   let entries = journal.entries();
   assert_eq!(entries.len(), 33);
   assert_eq!(entries.last().map(String::as_str), Some("conn"));
   assert_eq!(journal.closes_of("conn"), 1);
}

/// Builds a connection with `children` statements and releases every owner
/// in `order`, which is a permutation of `0..=children` where index 0 is the
/// connection.
fn release_in_order(children: usize, order: &[usize]) -> Journal {
   let journal = Journal::default();
   let conn = Owner::root(resource("conn", &journal), CONNECTION, CloseStrategy::Strict).unwrap();

   let mut owners: Vec<Option<Owner<Resource>>> = Vec::with_capacity(children + 1);
   let stmts: Vec<_> = (0..children)
      .map(|i| {
         conn
            .adopt(resource(&format!("stmt-{i}"), &journal), STATEMENT)
            .unwrap()
      })
      .collect();
   owners.push(Some(conn));
   owners.extend(stmts.into_iter().map(Some));

   for &index in order {
      if let Some(owner) = owners[index].take() {
         owner.release().unwrap();
      }
   }

   journal
}

proptest! {
   #[test]
   fn prop_any_release_order_closes_each_once(
      order in (1usize..8).prop_flat_map(|n| Just((0..=n).collect::<Vec<_>>()).prop_shuffle())
   ) {
      let children = order.len() - 1;
      let journal = release_in_order(children, &order);
      let entries = journal.entries();

      prop_assert_eq!(entries.len(), children + 1);
      prop_assert_eq!(journal.closes_of("conn"), 1);
      prop_assert_eq!(entries.last().map(String::as_str), Some("conn"));
      for i in 0..children {
         prop_assert_eq!(journal.closes_of(&format!("stmt-{i}")), 1);
      }
   }
}
