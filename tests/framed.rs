use std::io::Cursor;

use vfsd_client::{
    FrameConfig, VfsdCode,
    frame::{
        FramedReader, FramedWriter,
        postcard::{FramedPostcardReader, FramedPostcardWriter},
    },
    wire::{Arg, Message},
};

#[test]
fn messages_roundtrip_through_frames() {
    let mut io = Cursor::new(Vec::<u8>::new());

    let call = Message::call(1, "Read", vec![Arg::Int32(3), Arg::UInt64(4096)]);
    let reply = Message::reply(1, vec![Arg::Int32(0), Arg::Bytes(b"0123456789".to_vec())]);
    {
        let mut w = FramedPostcardWriter::new(&mut io);
        w.send(&call).unwrap();
        w.send(&reply).unwrap();
    }

    io.set_position(0);
    let mut r = FramedPostcardReader::new(&mut io);
    assert_eq!(r.recv::<Message>().unwrap(), call);
    assert_eq!(r.recv::<Message>().unwrap(), reply);
}

#[test]
fn oversize_frame_is_drained_when_allowed() {
    let mut io = Cursor::new(Vec::<u8>::new());
    {
        let mut w = FramedWriter::new(&mut io);
        w.write_frame(b"12345678").unwrap();
        w.write_frame(b"ok").unwrap();
    }

    io.set_position(0);
    let cfg = FrameConfig { max_frame_len: 4, drain_oversize_up_to: 64 };
    let mut r = FramedReader::with_config(&mut io, cfg);

    let mut buf = Vec::new();
    let e = r.recv_into(&mut buf).unwrap_err();
    assert_eq!(e.code, VfsdCode::FrameTooLarge);
    assert!(format!("{e}").contains("Frame too large"));

    // the oversize frame was skipped, so the stream is still aligned
    r.recv_into(&mut buf).unwrap();
    assert_eq!(buf, b"ok");
}

#[test]
fn oversize_does_not_drain_by_default() {
    let mut io = Cursor::new(vec![
        0x05, 0x00, 0x00, 0x00, // len = 5
        b'a', b'b', b'c', b'd', b'e',
    ]);

    let mut r = FramedReader::with_max(&mut io, 2);
    let e = r.recv_into(&mut Vec::new()).unwrap_err();
    assert_eq!(e.code, VfsdCode::FrameTooLarge);
    assert_eq!(io.position(), 4);
}

#[test]
fn truncated_stream_reads_as_disconnect() {
    let mut io = Cursor::new(vec![0x08, 0x00, 0x00, 0x00, b'a', b'b']);
    let mut r = FramedReader::new(&mut io);
    let e = r.recv_into(&mut Vec::new()).unwrap_err();
    assert_eq!(e.code, VfsdCode::Internal);
}

#[test]
fn garbage_payload_is_a_decode_error() {
    let mut io = Cursor::new(Vec::<u8>::new());
    FramedWriter::new(&mut io).write_frame(&[0xff, 0xff, 0xff]).unwrap();

    io.set_position(0);
    let e = FramedPostcardReader::new(&mut io).recv::<Message>().unwrap_err();
    assert_eq!(e.code, VfsdCode::Decode);
}
