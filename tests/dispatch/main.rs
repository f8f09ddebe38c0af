mod batches;
mod persistence;
mod smtp;
