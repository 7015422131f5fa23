/*!
Observable objects with paired "will change" / "did change" notification
publishers.

Every observable entity exposes two no-payload broadcast channels: one fired
immediately before a mutation and one immediately after. Publishers are shared
by reference: however a handle was obtained, handles to the same object's
publisher fire together. Delivery is synchronous and in-line on the mutating
thread; no notification is queued or coalesced.

# Design requirements:
- Reactive fields ([`Published`]) report changes through their owning object's
  publishers without the owner forwarding anything by hand
- Objects with at least one reactive field share one lazily-bound publisher
  pair across all of their fields; objects with none fall back to a global
  identity-keyed registry so a plain object costs nothing until observed
- Registry entries are released deterministically when the owning object is
  dropped; no finalizer-ordering assumptions
- Nested observables propagate: a field wrapping an observable value, and the
  containers ([`ObservableVec`], [`ObservableMap`]), re-emit their children's
  change events as their own
- Serialization captures the plain values only; decoding re-establishes the
  subscription wiring

# Basic usage

```rust
use observable_object::*;

struct Weather {
    temperature: Published<i32>,
    humidity: Published<f64>,
    identity: ObjectIdentity,
}

impl Weather {
    fn new() -> Self {
        Self { temperature: Published::new(20), humidity: Published::new(0.4), identity: ObjectIdentity::new() }
    }

    // the explicit reactive-field list; this replaces runtime field discovery
    fn fields(&self) -> [&dyn PublishedParent; 2] { [&self.temperature, &self.humidity] }
}

impl Observable for Weather {
    fn will_change(&self) -> Broadcast<()> { self.identity.will_change(&self.fields()) }
    fn did_change(&self) -> Broadcast<()> { self.identity.did_change(&self.fields()) }
}

let weather = Weather::new();
let _watch = weather.did_change().listen(|_| println!("weather changed"));
let _temp = weather.temperature.value_did_change().listen(|t: i32| println!("temperature now {t}"));

weather.temperature.set(25); // prints "temperature now 25" and "weather changed"
weather.humidity.set(0.7); // prints "weather changed"
```

# Containers

```rust
use observable_object::*;
# struct Weather { temperature: Published<i32>, identity: ObjectIdentity }
# impl Weather {
#     fn new() -> Self { Self { temperature: Published::new(20), identity: ObjectIdentity::new() } }
#     fn fields(&self) -> [&dyn PublishedParent; 1] { [&self.temperature] }
# }
# impl Observable for Weather {
#     fn will_change(&self) -> Broadcast<()> { self.identity.will_change(&self.fields()) }
#     fn did_change(&self) -> Broadcast<()> { self.identity.did_change(&self.fields()) }
# }

let stations = ObservableVec::from_elements(vec![Weather::new(), Weather::new()]);
let _watch = stations.did_change().listen(|_| println!("some station changed"));

// membership changes and nested element changes both fire the container
stations.push(Weather::new());
stations.get_with(0, |station| station.temperature.set(31));
```
*/

pub mod broadcast;
pub mod collection;
pub mod links;
pub mod object;
pub mod published;
pub mod registry;

pub use broadcast::*;
pub use collection::*;
pub use links::*;
pub use object::*;
pub use published::*;
pub use registry::*;
