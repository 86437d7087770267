//! Cross-server scenarios: a client goes through the namespace server,
//! which re-raises to the block driver, which programs the gateway,
//! which pokes the (simulated) card.

use bramble::devmgr::DevMgrServer;
use bramble::iomem::IoMemServer;
use bramble::proto::wire::Message;
use bramble::proto::*;
use bramble::rpc::shm::MockSharedMemory;
use bramble::rpc::spawn::MockSpawner;
use bramble::rpc::time::MockClock;
use bramble::rpc::Router;
use bramble::sdstore::sim::SimEmmc;
use bramble::sdstore::{EmmcController, InProcessPort, SdDriver, SdStoreServer};
use pretty_assertions::assert_eq;
use std::rc::Rc;

const DEVMGR: Pid = 2;
const SDSTORE: Pid = 8;
const CLIENT: Pid = 1;
const WATCHER: Pid = 7;

const SD_PATH: &str = "/dev/storage/sd0";

fn io_plane() -> (Router, MockSharedMemory) {
    let mut router = Router::new();
    router.register(
        DEVMGR,
        Box::new(DevMgrServer::new(DEVMGR, Box::new(MockSpawner::new(100)))),
    );

    let clock = Rc::new(MockClock::new());
    let shm = MockSharedMemory::new();
    let gateway = IoMemServer::new(SimEmmc::new(), clock.clone(), Rc::new(shm.clone()));
    let driver = SdDriver::new(EmmcController::new(), InProcessPort::new(gateway), clock);
    router.register(SDSTORE, Box::new(SdStoreServer::new(driver, Rc::new(shm.clone()))));

    // the driver announces its device the way a freshly exec'd daemon
    // would
    router.request(
        SDSTORE,
        DEVMGR,
        RpcCode::VfsAdd,
        AddRequest {
            path: SD_PATH.into(),
            info: Stat::char_device(),
            handler: SDSTORE,
            device_info: vec![0x10, 0x11],
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(SDSTORE);
    let reply = AddResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(reply.status, AddStatus::Success);

    (router, shm)
}

#[test]
fn block_round_trip_through_the_whole_chain() {
    let (mut router, _shm) = io_plane();

    let pattern: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();
    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsWrite,
        WriteRequest {
            path: SD_PATH.into(),
            offset: 1024 * 512,
            shm_id: 0,
            data: pattern.clone(),
            len: 512,
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(CLIENT);
    assert_eq!(mail.len(), 1);
    let write = WriteResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(write.len, 512);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRead,
        ReadRequest {
            path: SD_PATH.into(),
            offset: 1024 * 512,
            len: 512,
            shm_id: 0,
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(CLIENT);
    assert_eq!(mail.len(), 1);
    let read = ReadResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(read.len, 512);
    assert_eq!(read.data, pattern);
}

#[test]
fn registration_notifies_the_directory_watcher() {
    let (mut router, _shm) = io_plane();

    router.request(
        WATCHER,
        DEVMGR,
        RpcCode::VfsWatchRegister,
        WatchRequest {
            target: "/dev/storage".into(),
            handler: WATCHER,
        }
        .encode(),
    );
    router.take_mailbox(WATCHER);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsAdd,
        AddRequest {
            path: "/dev/storage/mmc0".into(),
            info: Stat::char_device(),
            handler: SDSTORE,
            device_info: Vec::new(),
        }
        .encode(),
    );

    let events = router.take_mailbox(WATCHER);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, RpcCode::VfsWatchNotify);
    assert_eq!(
        WatchNotify::decode(&events[0].1).unwrap().path,
        "/dev/storage"
    );
}

#[test]
fn misaligned_write_bounces_through_the_chain() {
    let (mut router, _shm) = io_plane();

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsWrite,
        WriteRequest {
            path: SD_PATH.into(),
            offset: 100,
            shm_id: 0,
            data: vec![0; 512],
            len: 512,
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(CLIENT);
    let write = WriteResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(write.len, Errno::EAGAIN.length());
}

#[test]
fn shared_memory_payload_crosses_the_chain() {
    let (mut router, shm) = io_plane();

    let pattern: Vec<u8> = (0..1024).map(|i| (i as u8).wrapping_mul(3)).collect();
    let region = shm.create(11, 1024);
    region.write(0, &pattern).unwrap();

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsWrite,
        WriteRequest {
            path: SD_PATH.into(),
            offset: 0,
            shm_id: 11,
            data: Vec::new(),
            len: 1024,
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(CLIENT);
    let write = WriteResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(write.len, 1024);

    let readback = shm.create(12, 1024);
    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRead,
        ReadRequest {
            path: SD_PATH.into(),
            offset: 0,
            len: 1024,
            shm_id: 12,
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(CLIENT);
    let read = ReadResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(read.len, 1024);
    assert_eq!(readback.to_vec(), pattern);
}

#[test]
fn driver_death_yields_eio_not_a_hang() {
    let (mut router, _shm) = io_plane();
    router.kill(SDSTORE);

    router.request(
        CLIENT,
        DEVMGR,
        RpcCode::VfsRead,
        ReadRequest {
            path: SD_PATH.into(),
            offset: 0,
            len: 512,
            shm_id: 0,
        }
        .encode(),
    );
    let mut mail = router.take_mailbox(CLIENT);
    assert_eq!(mail.len(), 1);
    let read = ReadResponse::decode(&mail.pop().unwrap().1).unwrap();
    assert_eq!(read.len, Errno::EIO.length());
}
