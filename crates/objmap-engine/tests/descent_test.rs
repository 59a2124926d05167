//! Integration test: nested targets
//!
//! Chained-path rules, automatic descent into nested target records,
//! flattening of nested source records, cycles and the depth limit.

use chrono::NaiveDate;
use objmap_engine::{CyclePolicy, Error, Mapper, MapperConfig, record};

// Chained-path flattening into a flat view

#[derive(Debug, Default, Clone, PartialEq)]
struct Inner {
    int_value: i32,
    date: NaiveDate,
    text: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Outer {
    int_value: i32,
    float_value: f64,
    inner: Inner,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct FlatView {
    int_value: i32,
    float_value: f64,
    inner_int: i32,
    inner_date: NaiveDate,
    inner_text: String,
}

record!(Inner { int_value: i32, date: NaiveDate, text: String });
record!(Outer { int_value: i32, float_value: f64, inner: Inner });
record!(FlatView {
    int_value: i32,
    float_value: f64,
    inner_int: i32,
    inner_date: NaiveDate,
    inner_text: String,
});

// Same-source descent

#[derive(Debug, Default, Clone, PartialEq)]
struct Order {
    id: u32,
    customer_name: String,
    ship_to: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct CustomerView {
    name: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct ShippingView {
    line: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct OrderView {
    id: u32,
    customer: CustomerView,
    shipping: Option<ShippingView>,
    summary: CustomerView,
}

record!(Order { id: u32, customer_name: String, ship_to: String });
record!(CustomerView { name: String });
record!(ShippingView { line: String });
record!(OrderView {
    id: u32,
    customer: CustomerView,
    shipping: Option<ShippingView>,
    summary(get): CustomerView,
});

// Flattening of nested source records

#[derive(Debug, Default, Clone, PartialEq)]
struct Geo {
    lat: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Address {
    city: String,
    geo: Geo,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Person {
    name: String,
    home: Address,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Commuter {
    name: String,
    home: Address,
    work: Address,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct PlaceView {
    city: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct SpotView {
    lat: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct PersonView {
    name: String,
    place: PlaceView,
    spot: SpotView,
}

record!(Geo { lat: f64 });
record!(Address { city: String, geo: Geo });
record!(Person { name: String, home: Address });
record!(Commuter { name: String, home: Address, work: Address });
record!(PlaceView { city: String });
record!(SpotView { lat: f64 });
record!(PersonView { name: String, place: PlaceView, spot: SpotView });

#[derive(Debug, Default, Clone, PartialEq)]
struct Envelope {
    person: PersonView,
}

record!(Envelope { person: PersonView });

// Self-referencing types

#[derive(Debug, Default, Clone, PartialEq)]
struct Node {
    label: String,
    next: Option<Box<Node>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct NodeView {
    label: String,
    next: Option<Box<NodeView>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tree {
    name: String,
    children: Vec<Tree>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct TreeView {
    name: String,
    children: Vec<TreeView>,
}

record!(Node { label: String, next: Option<Box<Node>> });
record!(NodeView { label: String, next: Option<Box<NodeView>> });
record!(Tree { name: String, children: Vec<Tree> });
record!(TreeView { name: String, children: Vec<TreeView> });

fn person() -> Person {
    Person {
        name: "Ines".to_string(),
        home: Address {
            city: "Porto".to_string(),
            geo: Geo { lat: 41.15 },
        },
    }
}

fn leaf(name: &str) -> Tree {
    Tree {
        name: name.to_string(),
        children: Vec::new(),
    }
}

fn tree_mapper(config: MapperConfig) -> Mapper {
    let mapper = Mapper::with_config(config).unwrap();
    mapper
        .add_map::<Tree, TreeView>("name", "name")
        .unwrap()
        .add_map::<Tree, TreeView>("children", "children")
        .unwrap();
    mapper
}

#[test]
fn test_chained_paths_flatten_every_leaf() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Outer, FlatView>("int_value", "int_value")
        .unwrap()
        .add_map::<Outer, FlatView>("float_value", "float_value")
        .unwrap()
        .add_map::<Outer, FlatView>("inner.int_value", "inner_int")
        .unwrap()
        .add_map::<Outer, FlatView>("inner.date", "inner_date")
        .unwrap()
        .add_map::<Outer, FlatView>("inner.text", "inner_text")
        .unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let source = Outer {
        int_value: 7,
        float_value: 2.5,
        inner: Inner {
            int_value: -3,
            date,
            text: "nested".to_string(),
        },
    };
    let view: FlatView = mapper.map(&source, None, None).unwrap();

    assert_eq!(
        view,
        FlatView {
            int_value: 7,
            float_value: 2.5,
            inner_int: -3,
            inner_date: date,
            inner_text: "nested".to_string(),
        }
    );
}

#[test]
fn test_same_source_descent_fills_nested_targets() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Order, OrderView>("id", "id")
        .unwrap()
        .add_map::<Order, CustomerView>("customer_name", "name")
        .unwrap()
        .add_map::<Order, ShippingView>("ship_to", "line")
        .unwrap();

    let order = Order {
        id: 42,
        customer_name: "Rui".to_string(),
        ship_to: "Rua Nova 1".to_string(),
    };
    let view: OrderView = mapper.map(&order, None, None).unwrap();

    assert_eq!(view.id, 42);
    assert_eq!(view.customer.name, "Rui");
    assert_eq!(view.shipping.unwrap().line, "Rua Nova 1");
    // read-only properties are not descended into
    assert_eq!(view.summary, CustomerView::default());
}

#[test]
fn test_descent_reuses_existing_nested_value() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Order, OrderView>("id", "id")
        .unwrap();

    let existing = OrderView {
        customer: CustomerView {
            name: "kept".to_string(),
        },
        ..OrderView::default()
    };
    let view = mapper
        .map(&Order::default(), Some(existing), None)
        .unwrap();
    assert_eq!(view.customer.name, "kept");
}

#[test]
fn test_nested_source_flattens_into_nested_target() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap()
        .add_map::<Person, PersonView>("name", "name")
        .unwrap();

    let view: PersonView = mapper.map(&person(), None, None).unwrap();
    assert_eq!(view.name, "Ines");
    assert_eq!(view.place.city, "Porto");
}

#[test]
fn test_flattening_can_be_disabled() {
    let mapper = Mapper::with_config(MapperConfig::default().with_flattening(false)).unwrap();
    mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap()
        .add_map::<Person, PersonView>("name", "name")
        .unwrap();

    let view: PersonView = mapper.map(&person(), None, None).unwrap();
    assert_eq!(view.name, "Ines");
    assert_eq!(view.place, PlaceView::default());
}

#[test]
fn test_flattening_depth_is_bounded() {
    let deep = Mapper::new();
    deep.add_map::<Geo, SpotView>("lat", "lat").unwrap();
    let view: PersonView = deep.map(&person(), None, None).unwrap();
    assert_eq!(view.spot.lat, 41.15);

    let shallow =
        Mapper::with_config(MapperConfig::default().with_max_flatten_depth(1)).unwrap();
    shallow.add_map::<Geo, SpotView>("lat", "lat").unwrap();
    let view: PersonView = shallow.map(&person(), None, None).unwrap();
    assert_eq!(view.spot, SpotView::default());
}

#[test]
fn test_ambiguous_flattening_fails_when_pair_rules_come_first() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Commuter, PersonView>("name", "name")
        .unwrap();

    let err = mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap_err();
    match err {
        Error::AmbiguousFlattening { candidates, .. } => {
            assert_eq!(candidates.len(), 2);
            assert!(candidates[0].starts_with("home"));
            assert!(candidates[1].starts_with("work"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(!mapper.has_map::<Address, PlaceView>().unwrap());
    assert_eq!(mapper.rule_count::<Commuter, PersonView>().unwrap(), 1);
}

#[test]
fn test_ambiguous_flattening_fails_when_nested_rules_come_first() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap();

    let err = mapper
        .add_map::<Commuter, PersonView>("name", "name")
        .unwrap_err();
    assert!(matches!(err, Error::AmbiguousFlattening { .. }));
    assert!(!mapper.has_map::<Commuter, PersonView>().unwrap());
    assert_eq!(mapper.rule_count::<Address, PlaceView>().unwrap(), 1);
}

#[test]
fn test_ambiguity_reached_only_by_descent_fails_at_registration() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap();

    // (PersonView, Commuter) has no rules; mapping into Envelope descends
    // into it
    let err = mapper
        .add_action(|_: &Commuter, _: &mut Envelope| {})
        .unwrap_err();
    match err {
        Error::AmbiguousFlattening { target_type, .. } => {
            assert!(target_type.ends_with("PersonView::place"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!mapper.has_map::<Commuter, Envelope>().unwrap());
}

#[test]
fn test_ambiguity_below_descent_fails_when_nested_rules_come_last() {
    let mapper = Mapper::new();
    mapper
        .add_action(|_: &Commuter, _: &mut Envelope| {})
        .unwrap();

    let err = mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap_err();
    assert!(matches!(err, Error::AmbiguousFlattening { .. }));
    assert!(!mapper.has_map::<Address, PlaceView>().unwrap());

    let envelope: Envelope = mapper.map(&Commuter::default(), None, None).unwrap();
    assert_eq!(envelope, Envelope::default());
}

#[test]
fn test_ambiguity_is_not_checked_without_flattening() {
    let mapper = Mapper::with_config(MapperConfig::default().with_flattening(false)).unwrap();
    mapper
        .add_map::<Address, PlaceView>("city", "city")
        .unwrap()
        .add_map::<Commuter, PersonView>("name", "name")
        .unwrap();
    assert!(mapper.has_map::<Commuter, PersonView>().unwrap());
}

#[test]
fn test_cyclic_descent_is_skipped_by_default() {
    let mapper = Mapper::new();
    mapper
        .add_map::<Node, NodeView>("label", "label")
        .unwrap();

    let node = Node {
        label: "head".to_string(),
        next: Some(Box::new(Node {
            label: "tail".to_string(),
            next: None,
        })),
    };
    let view: NodeView = mapper.map(&node, None, None).unwrap();
    assert_eq!(view.label, "head");
    assert!(view.next.is_none());
}

#[test]
fn test_cyclic_descent_can_fail() {
    let mapper =
        Mapper::with_config(MapperConfig::default().with_cycle_policy(CyclePolicy::Fail)).unwrap();
    mapper
        .add_map::<Node, NodeView>("label", "label")
        .unwrap();

    let err = mapper
        .map::<Node, NodeView>(&Node::default(), None, None)
        .unwrap_err();
    match err {
        Error::CyclicDescent {
            source_type,
            target_type,
        } => {
            assert!(source_type.ends_with("Node"));
            assert!(target_type.ends_with("NodeView"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_recursive_arrays_map_through_rules() {
    let mapper = tree_mapper(MapperConfig::default());
    let tree = Tree {
        name: "root".to_string(),
        children: vec![
            Tree {
                name: "a".to_string(),
                children: vec![leaf("a1"), leaf("a2")],
            },
            leaf("b"),
        ],
    };

    let view: TreeView = mapper.map(&tree, None, None).unwrap();
    assert_eq!(view.name, "root");
    assert_eq!(view.children.len(), 2);
    assert_eq!(view.children[0].children[1].name, "a2");
    assert!(view.children[1].children.is_empty());
}

#[test]
fn test_depth_limit_is_enforced() {
    let mapper = tree_mapper(MapperConfig::default().with_max_depth(2));

    let shallow = Tree {
        name: "root".to_string(),
        children: vec![leaf("child")],
    };
    let view: TreeView = mapper.map(&shallow, None, None).unwrap();
    assert_eq!(view.children[0].name, "child");

    let deep = Tree {
        name: "root".to_string(),
        children: vec![Tree {
            name: "child".to_string(),
            children: vec![leaf("grandchild")],
        }],
    };
    let err = mapper
        .map::<Tree, TreeView>(&deep, None, None)
        .unwrap_err();
    assert!(matches!(err, Error::DepthExceeded { limit: 2 }));
}
