//! Control frame interceptor.

use tracing::{debug, warn};

use crate::events::EventSink;
use crate::protocol::{ControlFrame, Frame};

use super::dispatch::{FrameInterceptor, Intercepted};

/// Routes control-kind frames into an event sink and passes everything else on.
///
/// A control-kind frame is consumed even when its payload fails to decode, so
/// the RPC layer never sees session traffic.
pub struct ControlInterceptor {
    sink: EventSink<ControlFrame>,
}

impl ControlInterceptor {
    pub fn new(sink: EventSink<ControlFrame>) -> Self {
        Self { sink }
    }
}

impl FrameInterceptor for ControlInterceptor {
    fn intercept(&self, frame: Frame) -> Intercepted {
        if !frame.is_control() {
            return Intercepted::Pass(frame);
        }

        match frame.to_control() {
            Ok(control) => {
                debug!(?control, "Intercepted control frame");
                self.sink.push(control);
            }
            Err(e) => warn!(error = %e, len = frame.payload().len(), "Dropping malformed control frame"),
        }
        Intercepted::Consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTROL_FRAME_KIND;
    use crate::events::{EventListener, Next};
    use crate::protocol::{SignalKind, TermSize};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn control_frames_feed_the_listener() {
        let mut listener = EventListener::new(CancellationToken::new());
        let interceptor = ControlInterceptor::new(listener.sink());

        let frame = Frame::control(&ControlFrame::Signal(SignalKind::Quit)).unwrap();
        assert!(matches!(interceptor.intercept(frame), Intercepted::Consumed));
        assert_eq!(
            listener.next().await,
            Next::Event(ControlFrame::Signal(SignalKind::Quit))
        );
    }

    #[test]
    fn other_frames_pass_unchanged() {
        let listener: EventListener<ControlFrame> = EventListener::new(CancellationToken::new());
        let interceptor = ControlInterceptor::new(listener.sink());

        let frame = Frame::new(0x03, &b"notify"[..]);
        match interceptor.intercept(frame.clone()) {
            Intercepted::Pass(passed) => assert_eq!(passed, frame),
            Intercepted::Consumed => panic!("rpc frame consumed"),
        }
    }

    #[tokio::test]
    async fn malformed_control_frames_are_still_consumed() {
        let mut listener = EventListener::new(CancellationToken::new());
        let interceptor = ControlInterceptor::new(listener.sink());

        let garbage = Frame::new(CONTROL_FRAME_KIND, &[0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert!(matches!(interceptor.intercept(garbage), Intercepted::Consumed));

        // The listener still only sees well-formed events.
        listener.sink().push(ControlFrame::Resize(TermSize { cols: 90, rows: 30 }));
        assert_eq!(
            listener.next().await,
            Next::Event(ControlFrame::Resize(TermSize { cols: 90, rows: 30 }))
        );
    }
}
