use bramble_proto::wire::{DecodeError, Message};
use bramble_proto::*;

#[test]
fn vfs_message_roundtrip() {
    let add = AddRequest {
        path: "/dev/storage/sd0".into(),
        info: Stat::char_device(),
        handler: 42,
        device_info: vec![0x10, 0x11],
    };
    assert_eq!(AddRequest::decode(&add.encode()).unwrap(), add);

    let resp = AddResponse {
        status: AddStatus::AlreadyExist,
        handler: 42,
    };
    assert_eq!(AddResponse::decode(&resp.encode()).unwrap(), resp);

    let read = ReadRequest {
        path: "/dev/storage/sd0".into(),
        offset: 1024 * 512,
        len: 512,
        shm_id: 0,
    };
    assert_eq!(ReadRequest::decode(&read.encode()).unwrap(), read);

    let write = WriteRequest {
        path: "/dev/storage/sd0".into(),
        offset: 0,
        shm_id: 7,
        data: Vec::new(),
        len: 4096,
    };
    assert_eq!(WriteRequest::decode(&write.encode()).unwrap(), write);

    let watch = WatchRequest {
        target: "/dev/storage".into(),
        handler: 7,
    };
    assert_eq!(WatchRequest::decode(&watch.encode()).unwrap(), watch);

    let mount = MountRequest {
        source: "/dev/storage/sd0".into(),
        target: "/mnt".into(),
        fs_type: "fat32".into(),
        flags: 1,
        options: String::new(),
    };
    assert_eq!(MountRequest::decode(&mount.encode()).unwrap(), mount);
}

#[test]
fn mmio_program_roundtrip_preserves_outputs() {
    let mut step = MmioStep::read(0x20_0034)
        .with_loop(0xFFFF_FFFF, 3)
        .with_sleep(MmioSleep::Milliseconds, 1)
        .with_failure(0x8000);
    step.abort = MmioAbort::Timeout;
    step.skipped = false;
    step.value = 0xDEAD_BEEF;

    let program = MmioProgram::new(vec![step, MmioStep::write(0x20_0028, 1 << 15)]);
    let decoded = MmioProgram::decode(&program.encode()).unwrap();
    assert_eq!(decoded, program);
    assert_eq!(decoded.steps[0].abort, MmioAbort::Timeout);
}

#[test]
fn decode_rejects_unknown_action() {
    let mut bytes = MmioProgram::new(vec![MmioStep::read(0)]).encode();
    // first word after the count is the action tag
    bytes[4..8].copy_from_slice(&0xFFu32.to_le_bytes());
    assert_eq!(
        MmioProgram::decode(&bytes),
        Err(DecodeError::UnknownTag(0xFF))
    );
}

#[test]
fn decode_rejects_trailing_garbage() {
    let mut bytes = LookupRequest {
        path: "/dev/iomem".into(),
    }
    .encode();
    bytes.push(0);
    assert_eq!(LookupRequest::decode(&bytes), Err(DecodeError::Trailing));
}

#[test]
fn decode_rejects_short_buffer() {
    let bytes = StatResponse {
        success: true,
        handler: 3,
        info: Stat::char_device(),
    }
    .encode();
    assert_eq!(
        StatResponse::decode(&bytes[..bytes.len() - 1]),
        Err(DecodeError::Short)
    );
}

#[test]
fn errno_length_fields() {
    let resp = ReadResponse::error(Errno::ENOENT);
    assert_eq!(resp.len, -2);
    assert!(resp.data.is_empty());
}
