use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;
use std::thread;
use std::thread::JoinHandle;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) emplace_node_handlers: Vec<HandlerPtr<EmplaceNodeEvent>>,
    pub(crate) reparent_node_handlers: Vec<HandlerPtr<ReparentNodeEvent>>,
    pub(crate) rebuild_cache_handlers: Vec<HandlerPtr<RebuildCacheEvent>>,
    pub(crate) persistence_failure_handlers: Vec<HandlerPtr<PersistenceFailureEvent>>,
    pub(crate) inconsistent_state_handlers: Vec<HandlerPtr<InconsistentStateEvent>>,
}

impl EventHandlers {
    /// Collect the user's handlers, adding the default loggers in front of them if `log_events` is set.
    pub(crate) fn new(
        log_events: bool,
        on_emplace_node: Option<HandlerPtr<EmplaceNodeEvent>>,
        on_reparent_node: Option<HandlerPtr<ReparentNodeEvent>>,
        on_rebuild_cache: Option<HandlerPtr<RebuildCacheEvent>>,
        on_persistence_failure: Option<HandlerPtr<PersistenceFailureEvent>>,
        on_inconsistent_state: Option<HandlerPtr<InconsistentStateEvent>>,
    ) -> EventHandlers {
        let mut handlers = EventHandlers::default();

        if log_events {
            handlers.emplace_node_handlers.push(EmplaceNodeEvent::get_logger());
            handlers.reparent_node_handlers.push(ReparentNodeEvent::get_logger());
            handlers.rebuild_cache_handlers.push(RebuildCacheEvent::get_logger());
            handlers.persistence_failure_handlers.push(PersistenceFailureEvent::get_logger());
            handlers.inconsistent_state_handlers.push(InconsistentStateEvent::get_logger());
        }

        handlers.emplace_node_handlers.extend(on_emplace_node);
        handlers.reparent_node_handlers.extend(on_reparent_node);
        handlers.rebuild_cache_handlers.extend(on_rebuild_cache);
        handlers.persistence_failure_handlers.extend(on_persistence_failure);
        handlers.inconsistent_state_handlers.extend(on_inconsistent_state);

        handlers
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.emplace_node_handlers.is_empty()
            && self.reparent_node_handlers.is_empty()
            && self.rebuild_cache_handlers.is_empty()
            && self.persistence_failure_handlers.is_empty()
            && self.inconsistent_state_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::EmplaceNode(emplace_node_event) =>
                self.emplace_node_handlers.iter().for_each(|handler| handler(&emplace_node_event)),

            Event::ReparentNode(reparent_node_event) =>
                self.reparent_node_handlers.iter().for_each(|handler| handler(&reparent_node_event)),

            Event::RebuildCache(rebuild_cache_event) =>
                self.rebuild_cache_handlers.iter().for_each(|handler| handler(&rebuild_cache_event)),

            Event::PersistenceFailure(persistence_failure_event) =>
                self.persistence_failure_handlers.iter().for_each(|handler| handler(&persistence_failure_event)),

            Event::InconsistentState(inconsistent_state_event) =>
                self.inconsistent_state_handlers.iter().for_each(|handler| handler(&inconsistent_state_event)),
        }
    }
}

/// Start the thread that fires handlers for published events. The thread exits once every publisher
/// (i.e., the coordinator) has been dropped.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(event) = event_subscriber.recv() {
            event_handlers.fire_handlers(event)
        }
    })
}
