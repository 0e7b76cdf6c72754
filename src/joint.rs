//! Joint probability of independent events.

use std::collections::HashMap;

use crate::error::ExecutionError;
use crate::event::{Event, ExperimentId};
use crate::probability::{one, Probability};

/// Product of the probabilities of `events`.
///
/// The empty collection yields exactly 1. Events must come from pairwise
/// distinct experiments; "heads AND tails" of one flip has no meaning.
///
/// # Errors
///
/// Returns `ExecutionError::ConflictingEvents` naming the first pair of
/// events that share an experiment.
pub fn joint_probability<'a, I>(events: I) -> Result<Probability, ExecutionError>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut seen: HashMap<ExperimentId, &Event> = HashMap::new();
    let mut product = one();

    for event in events {
        if let Some(first) = seen.insert(event.experiment(), event) {
            return Err(ExecutionError::ConflictingEvents {
                experiment: event.experiment(),
                first: first.name().clone(),
                second: event.name().clone(),
            });
        }
        product *= event.probability();
    }

    tracing::trace!(events = seen.len(), probability = %product, "joint probability");
    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventName, Experiment};
    use crate::probability::ratio;

    fn coin() -> Experiment {
        Experiment::new([("heads", ratio(1, 2)), ("tails", ratio(1, 2))]).unwrap()
    }

    #[test]
    fn empty_collection_is_one() {
        assert_eq!(joint_probability(std::iter::empty()).unwrap(), one());
    }

    #[test]
    fn single_event_is_its_probability() {
        let exp = coin();
        let heads = exp.event(&"heads".into()).unwrap();
        assert_eq!(joint_probability([heads]).unwrap(), ratio(1, 2));
    }

    #[test]
    fn independent_events_multiply() {
        let a = coin();
        let b = Experiment::new([(1, ratio(1, 6)), (2, ratio(5, 6))]).unwrap();
        let heads = a.event(&"heads".into()).unwrap();
        let two = b.event(&EventName::Number(2)).unwrap();
        assert_eq!(joint_probability([heads, two]).unwrap(), ratio(5, 12));
    }

    #[test]
    fn same_experiment_conflicts() {
        let exp = coin();
        let heads = exp.event(&"heads".into()).unwrap();
        let tails = exp.event(&"tails".into()).unwrap();

        let err = joint_probability([heads, tails]).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::ConflictingEvents {
                experiment: exp.id(),
                first: EventName::from("heads"),
                second: EventName::from("tails"),
            }
        );
    }
}
