use probledger::{ratio, Probability, Session};

fn flip_both_sides(session: &Session, p: Probability) -> probledger::LedgerResult<()> {
    let coin = session.coin_flip(p)?;
    {
        let _heads = coin.heads().enter()?;
        session.write("heads", 1)?;
    }
    {
        let _tails = coin.tails().enter()?;
        session.write("tails", 1)?;
    }
    Ok(())
}

#[test]
fn fair_coin_splits_evenly() {
    let session = Session::new();
    flip_both_sides(&session, ratio(1, 2)).unwrap();

    assert_eq!(session.probability_of("heads").unwrap(), ratio(1, 2));
    assert_eq!(session.probability_of("tails").unwrap(), ratio(1, 2));
}

#[test]
fn biased_coins_are_complementary() {
    for p in [ratio(1, 10), ratio(1, 5), ratio(9, 10)] {
        let session = Session::new();
        flip_both_sides(&session, p.clone()).unwrap();

        let heads = session.probability_of("heads").unwrap();
        let tails = session.probability_of("tails").unwrap();
        assert_eq!(heads, p);
        assert_eq!(tails, ratio(1, 1) - &p);
        assert_eq!(heads + tails, ratio(1, 1));
    }
}

#[test]
fn coin_accepts_float_and_text_probabilities() {
    let session = Session::new();
    let from_float = session.coin_flip(0.5).unwrap();
    let from_text = session.coin_flip("0.25").unwrap();

    assert_eq!(from_float.p_heads(), &ratio(1, 2));
    assert_eq!(from_text.p_heads(), &ratio(1, 4));
}

#[test]
fn nested_coins_multiply() {
    let session = Session::new();
    let first = session.coin_flip(ratio(1, 2)).unwrap();
    let second = session.coin_flip(ratio(1, 2)).unwrap();

    for (outer, outer_label) in [(first.heads(), "H"), (first.tails(), "T")] {
        let _outer = outer.enter().unwrap();
        for (inner, inner_label) in [(second.heads(), "H"), (second.tails(), "T")] {
            let _inner = inner.enter().unwrap();
            session.write(format!("{outer_label}{inner_label}"), 1).unwrap();
        }
    }

    for name in ["HH", "HT", "TH", "TT"] {
        assert_eq!(session.probability_of(name).unwrap(), ratio(1, 4), "{name}");
    }
    assert!(session.active_events().is_empty());
}

#[test]
fn independent_biased_variables_multiply_pairwise() {
    let session = Session::new();
    let a = session
        .random_variable([("a1", ratio(1, 3)), ("a2", ratio(2, 3))])
        .unwrap();
    let b = session
        .random_variable([("b1", ratio(1, 5)), ("b2", ratio(3, 10)), ("b3", ratio(1, 2))])
        .unwrap();

    for a_name in ["a1", "a2"] {
        let _a = a.event(a_name).unwrap().enter().unwrap();
        for b_name in ["b1", "b2", "b3"] {
            let _b = b.event(b_name).unwrap().enter().unwrap();
            session.write(format!("{a_name}{b_name}"), 1).unwrap();
        }
    }

    let mut total = ratio(0, 1);
    for a_name in ["a1", "a2"] {
        for b_name in ["b1", "b2", "b3"] {
            let expected = a.probability(a_name).unwrap() * b.probability(b_name).unwrap();
            let got = session.probability_of(&format!("{a_name}{b_name}")).unwrap();
            assert_eq!(got, expected);
            total += got;
        }
    }
    assert_eq!(total, ratio(1, 1));
}
