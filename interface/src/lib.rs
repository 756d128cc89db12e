/*!
# alpao-dm interface

Interface definition between the clients of the deformable mirror command chain.

Data is passed to a client by invoking [Read::read] on the client.

Data is pulled out of a client by invoking [Write::write] on the client.

The client state is updated by invoking [Update::update] on the client,
always after all the [Read]s and before any [Write].

A chain of clients is driven as `read → update → write`, the output of one client
becoming the input of the next one when both share the same [UniqueIdentifier].
*/

use std::any::type_name;

mod data;
pub use data::Data;

/// Defines the data type associated with unique identifier data type
pub trait UniqueIdentifier: Send + Sync {
    type DataType: Send + Sync;
}

/// Client state update interface
pub trait Update: Send + Sync {
    fn update(&mut self) {}
}
/// Client input data reader interface
pub trait Read<U: UniqueIdentifier>: Update {
    /// Read data from an input
    fn read(&mut self, data: Data<U>);
}
/// Client output data writer interface
pub trait Write<U: UniqueIdentifier>: Update {
    fn write(&mut self) -> Option<Data<U>>;
}
/// Interface for IO data sizes
pub trait Size<U: UniqueIdentifier>: Update {
    fn len(&self) -> usize;
}

use log::{info, warn};

/// Logs a message, followed by the chain of causes of `e` if any
pub fn print_info<S: Into<String>>(msg: S, e: Option<&dyn std::error::Error>) {
    if let Some(e) = e {
        let mut msg: Vec<String> = vec![msg.into()];
        msg.push(format!("{}", e));
        let mut current = e.source();
        while let Some(cause) = current {
            msg.push(format!("{}", cause));
            current = cause.source();
        }
        warn!("{}", msg.join("\n .due to: "))
    } else {
        info!("{}", msg.into())
    }
}

/// Returns the name of type `T` without the module paths
pub fn trim_type_name<T>() -> String {
    fn trim(name: &str) -> String {
        if let Some((prefix, suffix)) = name.split_once('<') {
            let generics: Vec<_> = suffix.split(',').map(trim).collect();
            format!("{}<{}", trim(prefix), generics.join(","))
        } else if let Some((_, suffix)) = name.rsplit_once("::") {
            suffix.into()
        } else {
            name.into()
        }
    }
    trim(type_name::<T>())
}
