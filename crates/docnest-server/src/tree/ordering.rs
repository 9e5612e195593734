use docnest_shared::api::MoveDirection;

/// Plans a one-step move of `target` among `siblings`, which must already be
/// sorted in display order.
///
/// Returns the dense `(id, order)` assignment for every sibling, or `None`
/// if `target` is not among them. At either boundary the assignment only
/// re-packs the existing sequence.
pub fn plan_move(siblings: &[i64], target: i64, direction: MoveDirection) -> Option<Vec<(i64, i32)>> {
    let index = siblings.iter().position(|id| *id == target)?;
    let mut ids = siblings.to_vec();

    match direction {
        MoveDirection::Up if index > 0 => ids.swap(index, index - 1),
        MoveDirection::Down if index + 1 < ids.len() => ids.swap(index, index + 1),
        _ => {}
    }

    Some(
        ids.into_iter()
            .enumerate()
            .map(|(order, id)| (id, order as i32))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn swaps_with_neighbour() {
        assert_eq!(
            plan_move(&[10, 20, 30], 20, MoveDirection::Up),
            Some(vec![(20, 0), (10, 1), (30, 2)])
        );
        assert_eq!(
            plan_move(&[10, 20, 30], 20, MoveDirection::Down),
            Some(vec![(10, 0), (30, 1), (20, 2)])
        );
    }

    #[test]
    fn boundaries_keep_sequence() {
        let dense = vec![(10, 0), (20, 1), (30, 2)];
        assert_eq!(plan_move(&[10, 20, 30], 10, MoveDirection::Up), Some(dense.clone()));
        assert_eq!(plan_move(&[10, 20, 30], 30, MoveDirection::Down), Some(dense));
    }

    #[test]
    fn single_child_is_noop() {
        assert_eq!(plan_move(&[7], 7, MoveDirection::Down), Some(vec![(7, 0)]));
    }

    #[test]
    fn unknown_target() {
        assert_eq!(plan_move(&[1, 2], 3, MoveDirection::Up), None);
    }
}
