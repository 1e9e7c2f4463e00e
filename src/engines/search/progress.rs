use crate::types::StageKind;

pub trait ProgressCallback: Send {
    fn on_iteration_start(&mut self, iteration: usize, stage: StageKind, held: bool);
    fn on_iteration_complete(&mut self, iteration: usize, generated: usize, selected: Option<usize>);
    fn on_selection_complete(&mut self, names: &[String], rmse: f64);
}

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_iteration_start(&mut self, iteration: usize, stage: StageKind, held: bool) {
        if held {
            log::info!("Iteration {} ({}) starting, screening held", iteration, stage);
        } else {
            log::info!("Iteration {} ({}) starting...", iteration, stage);
        }
    }

    fn on_iteration_complete(&mut self, iteration: usize, generated: usize, selected: Option<usize>) {
        match selected {
            Some(kept) => log::info!(
                "Iteration {} complete. Screened to {}, generated {} columns",
                iteration, kept, generated
            ),
            None => log::info!("Iteration {} complete. Generated {} columns", iteration, generated),
        }
    }

    fn on_selection_complete(&mut self, names: &[String], rmse: f64) {
        log::info!("Selected [{}] with rmse {:.6e}", names.join(", "), rmse);
    }
}

/// Forwards progress to another thread, e.g. a front end driving the run.
pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    IterationStart { iteration: usize, stage: StageKind, held: bool },
    IterationComplete { iteration: usize, generated: usize, selected: Option<usize> },
    SelectionComplete { names: Vec<String>, rmse: f64 },
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_iteration_start(&mut self, iteration: usize, stage: StageKind, held: bool) {
        let _ = self.sender.send(ProgressMessage::IterationStart {
            iteration,
            stage,
            held,
        });
    }

    fn on_iteration_complete(&mut self, iteration: usize, generated: usize, selected: Option<usize>) {
        let _ = self.sender.send(ProgressMessage::IterationComplete {
            iteration,
            generated,
            selected,
        });
    }

    fn on_selection_complete(&mut self, names: &[String], rmse: f64) {
        let _ = self.sender.send(ProgressMessage::SelectionComplete {
            names: names.to_vec(),
            rmse,
        });
    }
}
