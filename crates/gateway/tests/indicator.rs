mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use mm_domain::chat::ChatType;
use mm_gateway::runtime::{IndicatorScheduler, IndicatorState};

use common::{group_ctx, one_to_one_ctx, FakePlatform};

const TIMEOUT: Duration = Duration::from_secs(20);

fn scheduler(platform: &Arc<FakePlatform>, delay_ms: u64) -> IndicatorScheduler {
    IndicatorScheduler::new(platform.clone(), Duration::from_millis(delay_ms), TIMEOUT)
}

#[tokio::test(start_paused = true)]
async fn slow_turn_fires_exactly_once() {
    let platform = Arc::new(FakePlatform::default());
    let handle = scheduler(&platform, 50).arm(&one_to_one_ctx(CancellationToken::new()));
    assert_eq!(handle.state(), IndicatorState::Armed);

    sleep(Duration::from_millis(200)).await;
    handle.complete();

    assert_eq!(handle.settle().await, IndicatorState::Fired);
    let calls = platform.typing_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].conversation_id, "U1");
    assert_eq!(calls[0].timeout, TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn fast_turn_never_fires() {
    let platform = Arc::new(FakePlatform::default());
    let handle = scheduler(&platform, 100).arm(&one_to_one_ctx(CancellationToken::new()));

    sleep(Duration::from_millis(10)).await;
    handle.complete();
    assert_eq!(handle.settle().await, IndicatorState::Cancelled);

    sleep(Duration::from_secs(1)).await;
    assert!(platform.typing_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels_the_timer() {
    let platform = Arc::new(FakePlatform::default());
    drop(scheduler(&platform, 100).arm(&one_to_one_ctx(CancellationToken::new())));

    sleep(Duration::from_secs(1)).await;
    assert!(platform.typing_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn group_and_room_chats_are_never_armed() {
    let platform = Arc::new(FakePlatform::default());
    for chat_type in [ChatType::Group, ChatType::Room] {
        let handle = scheduler(&platform, 0).arm(&group_ctx(chat_type));
        assert_eq!(handle.state(), IndicatorState::Idle);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.settle().await, IndicatorState::Idle);
    }
    assert!(platform.typing_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_context_stops_the_timer() {
    let platform = Arc::new(FakePlatform::default());
    let cancel = CancellationToken::new();
    let handle = scheduler(&platform, 100).arm(&one_to_one_ctx(cancel.clone()));

    sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    assert_eq!(handle.settle().await, IndicatorState::Cancelled);
    sleep(Duration::from_secs(1)).await;
    assert!(platform.typing_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_stops_the_timer() {
    let platform = Arc::new(FakePlatform::default());
    let ctx = one_to_one_ctx(CancellationToken::new()).with_timeout(Some(Duration::from_millis(40)));
    let handle = scheduler(&platform, 100).arm(&ctx);

    assert_eq!(handle.settle().await, IndicatorState::Cancelled);
    assert!(platform.typing_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_delay_fires_immediately() {
    let platform = Arc::new(FakePlatform::default());
    let handle = scheduler(&platform, 0).arm(&one_to_one_ctx(CancellationToken::new()));

    tokio::task::yield_now().await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(platform.typing_calls().len(), 1);
    assert_eq!(handle.settle().await, IndicatorState::Fired);
}

#[tokio::test(start_paused = true)]
async fn completing_does_not_abort_an_inflight_call() {
    let platform = Arc::new(FakePlatform::default());
    platform.set_typing_latency(Duration::from_millis(500));
    let handle = scheduler(&platform, 0).arm(&one_to_one_ctx(CancellationToken::new()));

    sleep(Duration::from_millis(10)).await;
    handle.complete();
    assert_eq!(handle.settle().await, IndicatorState::Fired);
    assert_eq!(platform.typing_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_platform_is_contained() {
    let platform = Arc::new(FakePlatform::default());
    platform.panic_on_typing();
    let handle = scheduler(&platform, 0).arm(&one_to_one_ctx(CancellationToken::new()));

    // The panic is caught inside the task; settling neither panics nor hangs.
    assert_eq!(handle.settle().await, IndicatorState::Fired);
    assert!(platform.typing_calls().is_empty());
}
