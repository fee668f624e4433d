//! Property tests for the frame codec.

use bytes::BytesMut;
use proptest::prelude::*;

use super::{ControlFrame, Frame, FrameCodec, SignalKind, TermSize};

fn arb_signal() -> impl Strategy<Value = SignalKind> {
    prop::sample::select(SignalKind::ALL.to_vec())
}

fn arb_control() -> impl Strategy<Value = ControlFrame> {
    prop_oneof![
        arb_signal().prop_map(ControlFrame::Signal),
        (any::<u16>(), any::<u16>())
            .prop_map(|(cols, rows)| ControlFrame::Resize(TermSize { cols, rows })),
    ]
}

proptest! {
    /// Opaque frames come back byte-for-byte, whatever their kind and payload.
    #[test]
    fn opaque_frames_survive_the_wire(kind in any::<u8>(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let frame = Frame::new(kind, payload.clone());
        let encoded = FrameCodec::encode(&frame).unwrap();
        let decoded = FrameCodec::decode_slice(&encoded).unwrap().unwrap();
        prop_assert_eq!(decoded.kind_byte(), kind);
        prop_assert_eq!(decoded.payload().as_ref(), payload.as_slice());
    }

    /// Splitting a stream at any point never yields a frame early or corrupts it.
    #[test]
    fn split_stream_decodes_identically(control in arb_control(), split in 0usize..32) {
        let frame = Frame::control(&control).unwrap();
        let encoded = FrameCodec::encode(&frame).unwrap();
        let split = split.min(encoded.len());

        let mut buf = BytesMut::from(&encoded[..split]);
        if split < encoded.len() {
            prop_assert!(FrameCodec::decode(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(&encoded[split..]);
        let decoded = FrameCodec::decode(&mut buf).unwrap().unwrap();
        prop_assert_eq!(decoded.to_control().unwrap(), control);
        prop_assert!(buf.is_empty());
    }
}
