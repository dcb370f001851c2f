mod mock;
mod scenarios_mandatories;
