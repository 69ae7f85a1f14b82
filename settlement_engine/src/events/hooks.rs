use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, InvoiceLifecycleEvent, RefundSettledEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub invoice_event_producer: Vec<EventProducer<InvoiceLifecycleEvent>>,
    pub refund_settled_producer: Vec<EventProducer<RefundSettledEvent>>,
}

pub struct EventHandlers {
    pub on_invoice_event: Option<EventHandler<InvoiceLifecycleEvent>>,
    pub on_refund_settled: Option<EventHandler<RefundSettledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_invoice_event = hooks.on_invoice_event.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_settled = hooks.on_refund_settled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_invoice_event, on_refund_settled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_invoice_event {
            result.invoice_event_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_settled {
            result.refund_settled_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_invoice_event {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_invoice_event: Option<Handler<InvoiceLifecycleEvent>>,
    pub on_refund_settled: Option<Handler<RefundSettledEvent>>,
}

impl EventHooks {
    pub fn on_invoice_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoiceLifecycleEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_invoice_event = Some(Arc::new(f));
        self
    }

    pub fn on_refund_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_settled = Some(Arc::new(f));
        self
    }
}
