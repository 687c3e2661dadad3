//! A simple example of what beacon has to offer

use beacon::event::listener::Listener;
use beacon::event::net_status::{level, Info, NetStatusEvent, NET_STATUS};
use beacon::event::target::{EventTarget, Target};
use beacon::event::timer::{TimerEvent, TIMER, TIMER_COMPLETE};
use beacon::event::Event;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn main() {
  let target = EventTarget::new();
  let ticks = Arc::new(AtomicUsize::new(0));

  // Every third tick completes the timer, dispatched from inside the tick
  // listener on the same target.
  let counted = ticks.clone();
  target.add_event_listener(
    TIMER,
    &Listener::new(move |event| {
      let tick = counted.fetch_add(1, Ordering::Relaxed) + 1;
      println!("{} #{}", event, tick);
      if tick % 3 == 0 {
        if let Some(hub) = event.dispatch_point() {
          hub.dispatch_event(&mut TimerEvent::detached(TIMER_COMPLETE));
        }
      }
    }),
  );
  target.add_event_listener(
    TIMER_COMPLETE,
    &Listener::once(|event| println!("{} (reported once)", event)),
  );
  target.add_event_listener(
    NET_STATUS,
    &Listener::new(|event| {
      if let Some(status) = event.downcast_ref::<NetStatusEvent>() {
        println!("{} info={:?}", status, status.info);
      }
      event.stop_propagation();
    }),
  );

  for _ in 0..6 {
    target.dispatch_event(&mut TimerEvent::new(TIMER, &target));
  }
  let mut info = Info::new();
  info.insert("ticks".to_owned(), (ticks.load(Ordering::Relaxed) as i64).into());
  let result = target.dispatch_event(&mut NetStatusEvent::new(
    NET_STATUS,
    &target,
    level::STATUS,
    "Timer.Stopped",
    "timer stopped",
    info,
  ));
  println!("net status dispatch: {:?}", result);
}
